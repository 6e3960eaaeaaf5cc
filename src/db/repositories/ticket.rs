use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};

use crate::entities::tickets::{self, TicketPriority, TicketStatus};

/// Listing predicate. `owner_scope` restricts results to one owner and is how
/// non-privileged callers are fenced to their own tickets.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub assigned_to: Option<i32>,
    pub owner_scope: Option<i32>,
}

/// Field-wise update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct TicketPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<TicketPriority>,
    pub status: Option<TicketStatus>,
    pub assigned_to: Option<Option<i32>>,
}

/// Result of a guarded update.
#[derive(Debug)]
pub enum UpdateOutcome<E> {
    Updated(tickets::Model),
    Missing,
    Rejected(E),
}

pub struct TicketRepository {
    conn: DatabaseConnection,
}

impl TicketRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(
        &self,
        owner_id: i32,
        title: &str,
        description: &str,
        priority: TicketPriority,
    ) -> Result<tickets::Model> {
        let now = chrono::Utc::now().to_rfc3339();
        let active = tickets::ActiveModel {
            title: Set(title.to_string()),
            description: Set(description.to_string()),
            status: Set(TicketStatus::Open),
            priority: Set(priority),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            assigned_to: Set(None),
            user_id: Set(owner_id),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert ticket")?;

        Ok(model)
    }

    pub async fn get(&self, id: i32) -> Result<Option<tickets::Model>> {
        tickets::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query ticket by ID")
    }

    /// List tickets newest first. The total count is taken under the same
    /// predicate as the page fetch.
    pub async fn list(
        &self,
        filter: &TicketFilter,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<tickets::Model>, u64)> {
        let mut query = tickets::Entity::find().order_by_desc(tickets::Column::Id);

        if let Some(status) = filter.status {
            query = query.filter(tickets::Column::Status.eq(status));
        }
        if let Some(priority) = filter.priority {
            query = query.filter(tickets::Column::Priority.eq(priority));
        }
        if let Some(assignee) = filter.assigned_to {
            query = query.filter(tickets::Column::AssignedTo.eq(assignee));
        }
        if let Some(owner) = filter.owner_scope {
            query = query.filter(tickets::Column::UserId.eq(owner));
        }

        let paginator = query.paginate(&self.conn, page_size);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;

        Ok((items, total))
    }

    /// Apply a patch to an existing ticket inside one transaction so the
    /// read and the write cannot interleave with another writer. The owner
    /// column is never touched.
    ///
    /// The validator runs against the row as read inside the transaction, so
    /// a decision made from a stale snapshot can never commit.
    pub async fn update<F, E>(
        &self,
        id: i32,
        patch: TicketPatch,
        validate: F,
    ) -> Result<UpdateOutcome<E>>
    where
        F: FnOnce(&tickets::Model) -> Result<(), E> + Send,
        E: Send,
    {
        let txn = self
            .conn
            .begin()
            .await
            .context("Failed to open transaction for ticket update")?;

        let Some(ticket) = tickets::Entity::find_by_id(id)
            .one(&txn)
            .await
            .context("Failed to query ticket for update")?
        else {
            txn.commit().await?;
            return Ok(UpdateOutcome::Missing);
        };

        if let Err(reason) = validate(&ticket) {
            txn.commit().await?;
            return Ok(UpdateOutcome::Rejected(reason));
        }

        let mut active: tickets::ActiveModel = ticket.into();

        if let Some(title) = patch.title {
            active.title = Set(title);
        }
        if let Some(description) = patch.description {
            active.description = Set(description);
        }
        if let Some(priority) = patch.priority {
            active.priority = Set(priority);
        }
        if let Some(status) = patch.status {
            active.status = Set(status);
        }
        if let Some(assigned_to) = patch.assigned_to {
            active.assigned_to = Set(assigned_to);
        }
        active.updated_at = Set(chrono::Utc::now().to_rfc3339());

        let updated = active
            .update(&txn)
            .await
            .context("Failed to update ticket")?;

        txn.commit().await?;

        Ok(UpdateOutcome::Updated(updated))
    }

    /// Delete a ticket. Attachment rows go with it via cascade.
    pub async fn delete(&self, id: i32) -> Result<bool> {
        let result = tickets::Entity::delete_by_id(id)
            .exec(&self.conn)
            .await
            .context("Failed to delete ticket")?;

        Ok(result.rows_affected > 0)
    }
}
