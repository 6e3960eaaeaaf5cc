use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};

use crate::entities::audit_log;

/// Append-only audit trail. There is deliberately no update or delete here.
pub struct AuditRepository {
    conn: DatabaseConnection,
}

impl AuditRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn append(
        &self,
        actor_id: Option<i32>,
        action: &str,
        entity: &str,
        entity_id: i32,
        details: &str,
    ) -> Result<()> {
        let active = audit_log::ActiveModel {
            ts: Set(chrono::Utc::now().to_rfc3339()),
            actor_id: Set(actor_id),
            action: Set(action.to_string()),
            entity: Set(entity.to_string()),
            entity_id: Set(entity_id),
            details: Set(details.to_string()),
            ..Default::default()
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to append audit entry")?;

        Ok(())
    }

    /// List entries newest first, optionally filtered by action or entity kind.
    pub async fn list(
        &self,
        action_filter: Option<String>,
        entity_filter: Option<String>,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<audit_log::Model>, u64)> {
        let mut query = audit_log::Entity::find().order_by_desc(audit_log::Column::Id);

        if let Some(action) = action_filter {
            query = query.filter(audit_log::Column::Action.eq(action));
        }
        if let Some(entity) = entity_filter {
            query = query.filter(audit_log::Column::Entity.eq(entity));
        }

        let paginator = query.paginate(&self.conn, page_size);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page - 1).await?;

        Ok((items, total))
    }
}
