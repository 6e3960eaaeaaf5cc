pub use super::attachments::Entity as Attachments;
pub use super::audit_log::Entity as AuditLog;
pub use super::password_reset_tokens::Entity as PasswordResetTokens;
pub use super::tickets::Entity as Tickets;
pub use super::users::Entity as Users;
