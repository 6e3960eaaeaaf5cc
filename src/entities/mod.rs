pub mod prelude;

pub mod attachments;
pub mod audit_log;
pub mod password_reset_tokens;
pub mod tickets;
pub mod users;
