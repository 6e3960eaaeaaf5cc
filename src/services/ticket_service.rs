//! Ticket lifecycle: creation, partial updates under the status state
//! machine, triage actions, and the audit entries each mutation leaves
//! behind.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::constants::{DESCRIPTION_MAX_LEN, PAGE_SIZE_MAX, PAGE_SIZE_MIN, TITLE_MAX_LEN};
use crate::db::{Store, TicketFilter, TicketPatch, UpdateOutcome};
use crate::entities::tickets::{self, TicketPriority, TicketStatus};
use crate::services::access::{Action, Actor, Resource, authorize};
use crate::services::blob::BlobStore;

#[derive(Debug, Error)]
pub enum TicketError {
    #[error("Ticket not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<anyhow::Error> for TicketError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Partial update payload. `None` fields keep their stored value.
#[derive(Debug, Default, Clone)]
pub struct TicketUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TicketPriority>,
    pub status: Option<TicketStatus>,
}

/// Status transitions permitted on a regular update. `close` bypasses this
/// and forces Closed from any state.
#[must_use]
pub fn transition_allowed(from: TicketStatus, to: TicketStatus) -> bool {
    use TicketStatus::{Closed, InProgress, Open};

    matches!(
        (from, to),
        (Open, InProgress)
            | (InProgress, Open)
            | (Open, Closed)
            | (InProgress, Closed)
            | (Closed, Open)
    )
}

#[derive(Clone)]
pub struct TicketService {
    store: Store,
    blob: Arc<dyn BlobStore>,
}

impl TicketService {
    #[must_use]
    pub fn new(store: Store, blob: Arc<dyn BlobStore>) -> Self {
        Self { store, blob }
    }

    pub async fn create(
        &self,
        actor: &Actor,
        title: &str,
        description: &str,
        priority: TicketPriority,
    ) -> Result<tickets::Model, TicketError> {
        validate_title(title)?;
        validate_description(description)?;

        let ticket = self
            .store
            .create_ticket(actor.id, title, description, priority)
            .await?;

        self.audit(actor, "create", ticket.id, &format!("title={title}"))
            .await;

        Ok(ticket)
    }

    /// Existence is checked before authorization so a 404 never masks a
    /// genuine 403 on a real ticket.
    pub async fn get(&self, actor: &Actor, id: i32) -> Result<tickets::Model, TicketError> {
        let ticket = self.store.get_ticket(id).await?.ok_or(TicketError::NotFound)?;

        let resource = Resource::Ticket {
            owner_id: ticket.user_id,
        };
        if !authorize(actor, Action::ViewTicket, &resource) {
            return Err(TicketError::Forbidden);
        }

        Ok(ticket)
    }

    /// List a page of tickets. Non-privileged actors only ever see their
    /// own; page and size are clamped rather than rejected.
    pub async fn list(
        &self,
        actor: &Actor,
        status: Option<TicketStatus>,
        priority: Option<TicketPriority>,
        assigned_to: Option<i32>,
        page: u64,
        size: u64,
    ) -> Result<(Vec<tickets::Model>, u64), TicketError> {
        let page = page.max(1);
        let size = size.clamp(PAGE_SIZE_MIN, PAGE_SIZE_MAX);

        let filter = TicketFilter {
            status,
            priority,
            assigned_to,
            owner_scope: (!actor.role.is_privileged()).then_some(actor.id),
        };

        let (items, total) = self.store.list_tickets(&filter, page, size).await?;
        Ok((items, total))
    }

    pub async fn update(
        &self,
        actor: &Actor,
        id: i32,
        update: TicketUpdate,
    ) -> Result<tickets::Model, TicketError> {
        let ticket = self.store.get_ticket(id).await?.ok_or(TicketError::NotFound)?;

        let resource = Resource::Ticket {
            owner_id: ticket.user_id,
        };
        if !authorize(actor, Action::UpdateTicket, &resource) {
            return Err(TicketError::Forbidden);
        }

        if let Some(title) = &update.title {
            validate_title(title)?;
        }
        if let Some(description) = &update.description {
            validate_description(description)?;
        }

        let patch = TicketPatch {
            title: update.title,
            description: update.description,
            priority: update.priority,
            status: update.status,
            assigned_to: None,
        };

        // The transition is judged against the row inside the update
        // transaction, not the snapshot read above: a concurrent status
        // change would otherwise let a stale check commit a forbidden edge.
        let requested = update.status;
        let privileged = actor.role.is_privileged();
        let outcome = self
            .store
            .update_ticket(id, patch, move |current: &tickets::Model| {
                let Some(to) = requested else {
                    return Ok(());
                };
                if to == current.status {
                    return Ok(());
                }
                // Status transitions are a triage action, owner rights are not enough.
                if !privileged {
                    return Err(TicketError::Forbidden);
                }
                if !transition_allowed(current.status, to) {
                    return Err(TicketError::Validation(format!(
                        "Cannot move a {:?} ticket to {to:?}",
                        current.status
                    )));
                }
                Ok(())
            })
            .await?;

        let updated = match outcome {
            UpdateOutcome::Updated(model) => model,
            UpdateOutcome::Missing => return Err(TicketError::NotFound),
            UpdateOutcome::Rejected(err) => return Err(err),
        };

        self.audit(actor, "update", id, "fields updated").await;

        Ok(updated)
    }

    pub async fn delete(&self, actor: &Actor, id: i32) -> Result<(), TicketError> {
        let ticket = self.store.get_ticket(id).await?.ok_or(TicketError::NotFound)?;

        let resource = Resource::Ticket {
            owner_id: ticket.user_id,
        };
        if !authorize(actor, Action::DeleteTicket, &resource) {
            return Err(TicketError::Forbidden);
        }

        let attachments = self.store.list_attachments(id).await?;

        if !self.store.delete_ticket(id).await? {
            return Err(TicketError::NotFound);
        }

        // The rows are gone; orphaned bytes are logged, not surfaced.
        for attachment in &attachments {
            if let Err(e) = self.blob.remove(&attachment.stored_ref).await {
                warn!(
                    "Blob removal failed for {} on ticket {id}: {e}",
                    attachment.stored_ref
                );
            }
        }

        self.audit(actor, "delete", id, &format!("title={}", ticket.title))
            .await;

        Ok(())
    }

    pub async fn assign(
        &self,
        actor: &Actor,
        id: i32,
        assignee_id: i32,
    ) -> Result<tickets::Model, TicketError> {
        let ticket = self.store.get_ticket(id).await?.ok_or(TicketError::NotFound)?;

        let resource = Resource::Ticket {
            owner_id: ticket.user_id,
        };
        if !authorize(actor, Action::AssignTicket, &resource) {
            return Err(TicketError::Forbidden);
        }

        if self.store.get_user(assignee_id).await?.is_none() {
            return Err(TicketError::Validation(format!(
                "Assignee {assignee_id} does not exist"
            )));
        }

        let patch = TicketPatch {
            assigned_to: Some(Some(assignee_id)),
            ..Default::default()
        };

        let updated = match self
            .store
            .update_ticket(id, patch, |_: &tickets::Model| Ok::<_, TicketError>(()))
            .await?
        {
            UpdateOutcome::Updated(model) => model,
            UpdateOutcome::Missing | UpdateOutcome::Rejected(_) => {
                return Err(TicketError::NotFound);
            }
        };

        self.audit(actor, "assign", id, &format!("assignee={assignee_id}"))
            .await;

        Ok(updated)
    }

    /// Force the terminal state regardless of the current one.
    pub async fn close(&self, actor: &Actor, id: i32) -> Result<tickets::Model, TicketError> {
        let ticket = self.store.get_ticket(id).await?.ok_or(TicketError::NotFound)?;

        let resource = Resource::Ticket {
            owner_id: ticket.user_id,
        };
        if !authorize(actor, Action::CloseTicket, &resource) {
            return Err(TicketError::Forbidden);
        }

        let patch = TicketPatch {
            status: Some(TicketStatus::Closed),
            ..Default::default()
        };

        let updated = match self
            .store
            .update_ticket(id, patch, |_: &tickets::Model| Ok::<_, TicketError>(()))
            .await?
        {
            UpdateOutcome::Updated(model) => model,
            UpdateOutcome::Missing | UpdateOutcome::Rejected(_) => {
                return Err(TicketError::NotFound);
            }
        };

        self.audit(actor, "close", id, "").await;

        Ok(updated)
    }

    /// Audit writes happen after the mutation has committed and never fail
    /// the request they describe.
    async fn audit(&self, actor: &Actor, action: &str, ticket_id: i32, details: &str) {
        if let Err(e) = self
            .store
            .append_audit(Some(actor.id), action, "ticket", ticket_id, details)
            .await
        {
            warn!("Audit append failed for {action} on ticket {ticket_id}: {e}");
        }
    }
}

fn validate_title(title: &str) -> Result<(), TicketError> {
    if title.is_empty() || title.chars().count() > TITLE_MAX_LEN {
        return Err(TicketError::Validation(format!(
            "Title must be between 1 and {TITLE_MAX_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), TicketError> {
    if description.is_empty() || description.chars().count() > DESCRIPTION_MAX_LEN {
        return Err(TicketError::Validation(format!(
            "Description must be between 1 and {DESCRIPTION_MAX_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use TicketStatus::{Closed, InProgress, Open};

    #[test]
    fn forward_transitions_allowed() {
        assert!(transition_allowed(Open, InProgress));
        assert!(transition_allowed(InProgress, Open));
        assert!(transition_allowed(Open, Closed));
        assert!(transition_allowed(InProgress, Closed));
    }

    #[test]
    fn reopen_is_the_only_edge_out_of_closed() {
        assert!(transition_allowed(Closed, Open));
        assert!(!transition_allowed(Closed, InProgress));
    }

    #[test]
    fn title_bounds() {
        assert!(validate_title("x").is_ok());
        assert!(validate_title(&"x".repeat(160)).is_ok());
        assert!(validate_title("").is_err());
        assert!(validate_title(&"x".repeat(161)).is_err());
    }

    #[test]
    fn description_bounds() {
        assert!(validate_description("broken").is_ok());
        assert!(validate_description(&"d".repeat(10_000)).is_ok());
        assert!(validate_description("").is_err());
        assert!(validate_description(&"d".repeat(10_001)).is_err());
    }
}
