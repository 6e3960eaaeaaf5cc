pub mod access;
pub mod attachment_service;
pub mod auth_service;
pub mod auth_service_impl;
pub mod blob;
pub mod notifier;
pub mod throttle;
pub mod ticket_service;

pub use access::{Action, Actor, Resource, authorize};
pub use attachment_service::{AttachmentError, AttachmentService};
pub use auth_service::{AuthError, AuthService};
pub use auth_service_impl::SeaOrmAuthService;
pub use blob::{BlobStore, HttpBlobStore, LocalBlobStore};
pub use notifier::{LogNotifier, MailNotifier, Notifier};
pub use throttle::AuthThrottle;
pub use ticket_service::{TicketError, TicketService, TicketUpdate};
