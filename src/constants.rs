//! Fixed limits shared between validation, handlers and tests.

pub const TITLE_MAX_LEN: usize = 160;

pub const DESCRIPTION_MAX_LEN: usize = 10_000;

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 80;

pub const PASSWORD_MIN_LEN: usize = 8;

pub const PAGE_SIZE_MIN: u64 = 1;
pub const PAGE_SIZE_MAX: u64 = 100;
pub const PAGE_SIZE_DEFAULT: u64 = 20;

/// Upload cap enforced at the body-limit layer before any handler runs.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Attachment extensions accepted on upload, lowercase.
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "pdf", "txt", "log", "csv", "mp4"];

/// Sessions expire after this much inactivity.
pub const SESSION_IDLE_MINUTES: i64 = 30;
