//! Attachment handling: filename hygiene, the extension allow-list, and the
//! hand-off of bytes to the blob store before any metadata row is written.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::constants::ALLOWED_EXTENSIONS;
use crate::db::Store;
use crate::entities::attachments;
use crate::services::access::{Action, Actor, Resource, authorize};
use crate::services::blob::BlobStore;

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("Ticket not found")]
    TicketNotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for AttachmentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Strip directory components and reject anything that is not a plain,
/// printable filename. Returns the display-safe name.
#[must_use]
pub fn sanitize_filename(declared: &str) -> Option<String> {
    // Whatever path flavor the client used, keep only the last segment.
    let name = declared
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    if name.chars().any(char::is_control) {
        return None;
    }

    Some(name.to_string())
}

/// Extension check against the fixed allow-list, case-insensitive.
#[must_use]
pub fn extension_allowed(filename: &str) -> bool {
    filename.rsplit_once('.').is_some_and(|(stem, ext)| {
        !stem.is_empty() && ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
    })
}

/// Storage keys are never derived from user input alone: a random 16-hex
/// prefix guarantees unguessability and prevents collisions.
#[must_use]
pub fn storage_key(safe_name: &str) -> String {
    use rand::Rng;
    use std::fmt::Write;

    let mut rng = rand::rng();
    let bytes: [u8; 8] = rng.random();

    let mut key = bytes.iter().fold(String::with_capacity(16), |mut acc, b| {
        let _ = write!(acc, "{b:02x}");
        acc
    });
    key.push('_');
    key.push_str(safe_name);
    key
}

#[derive(Clone)]
pub struct AttachmentService {
    store: Store,
    blob: Arc<dyn BlobStore>,
}

impl AttachmentService {
    #[must_use]
    pub fn new(store: Store, blob: Arc<dyn BlobStore>) -> Self {
        Self { store, blob }
    }

    pub async fn upload(
        &self,
        actor: &Actor,
        ticket_id: i32,
        declared_filename: &str,
        bytes: &[u8],
    ) -> Result<attachments::Model, AttachmentError> {
        let ticket = self
            .store
            .get_ticket(ticket_id)
            .await?
            .ok_or(AttachmentError::TicketNotFound)?;

        let resource = Resource::Ticket {
            owner_id: ticket.user_id,
        };
        if !authorize(actor, Action::AttachToTicket, &resource) {
            return Err(AttachmentError::Forbidden);
        }

        let safe_name = sanitize_filename(declared_filename)
            .ok_or_else(|| AttachmentError::Validation("Invalid filename".to_string()))?;

        if !extension_allowed(&safe_name) {
            return Err(AttachmentError::Validation(format!(
                "File type not allowed; accepted extensions: {}",
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }

        let key = storage_key(&safe_name);
        let mime = mime_guess::from_path(&safe_name)
            .first_or_octet_stream()
            .to_string();

        // Bytes land in the blob store first; only a successful write gets a
        // metadata row, and no database transaction spans the transfer.
        self.blob
            .put(&key, bytes)
            .await
            .map_err(|e| AttachmentError::Storage(e.to_string()))?;

        let size = i64::try_from(bytes.len()).unwrap_or(i64::MAX);
        let attachment = self
            .store
            .add_attachment(ticket_id, &safe_name, &key, &mime, size, actor.id)
            .await?;

        if let Err(e) = self
            .store
            .append_audit(
                Some(actor.id),
                "attach",
                "ticket",
                ticket_id,
                &format!("filename={safe_name}"),
            )
            .await
        {
            warn!("Audit append failed for attach on ticket {ticket_id}: {e}");
        }

        Ok(attachment)
    }

    /// Listing an attachment set follows ticket view rights.
    pub async fn list(
        &self,
        actor: &Actor,
        ticket_id: i32,
    ) -> Result<Vec<(attachments::Model, String)>, AttachmentError> {
        let ticket = self
            .store
            .get_ticket(ticket_id)
            .await?
            .ok_or(AttachmentError::TicketNotFound)?;

        let resource = Resource::Ticket {
            owner_id: ticket.user_id,
        };
        if !authorize(actor, Action::ViewTicket, &resource) {
            return Err(AttachmentError::Forbidden);
        }

        let rows = self.store.list_attachments(ticket_id).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let url = self
                .blob
                .url_for(&row.stored_ref)
                .await
                .map_err(|e| AttachmentError::Storage(e.to_string()))?;
            out.push((row, url));
        }

        Ok(out)
    }

    /// Fetch raw bytes for a stored key. The caller has already passed the
    /// session gate; the key itself is traversal-checked inside the store.
    pub async fn open(&self, key: &str) -> Result<Option<Vec<u8>>, AttachmentError> {
        self.blob
            .get(key)
            .await
            .map_err(|e| AttachmentError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(
            sanitize_filename("/etc/passwd").as_deref(),
            Some("passwd")
        );
        assert_eq!(
            sanitize_filename("..\\..\\boot.ini").as_deref(),
            Some("boot.ini")
        );
        assert_eq!(
            sanitize_filename("reports/march.csv").as_deref(),
            Some("march.csv")
        );
    }

    #[test]
    fn sanitize_rejects_garbage() {
        assert!(sanitize_filename("").is_none());
        assert!(sanitize_filename("   ").is_none());
        assert!(sanitize_filename("..").is_none());
        assert!(sanitize_filename("uploads/").is_none());
        assert!(sanitize_filename("bad\u{0}name.txt").is_none());
    }

    #[test]
    fn allow_list_is_enforced() {
        assert!(extension_allowed("screenshot.png"));
        assert!(extension_allowed("LOG.TXT"));
        assert!(extension_allowed("dump.log"));
        assert!(!extension_allowed("payload.exe"));
        assert!(!extension_allowed("script.sh"));
        assert!(!extension_allowed("noextension"));
        assert!(!extension_allowed(".gitignore"));
    }

    #[test]
    fn storage_keys_are_unique_and_safe() {
        let a = storage_key("report.pdf");
        let b = storage_key("report.pdf");

        assert_ne!(a, b);
        assert!(a.ends_with("_report.pdf"));
        assert_eq!(a.len(), 16 + 1 + "report.pdf".len());
        assert!(crate::services::blob::is_safe_key(&a));
    }
}
