use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::attachments;

pub struct AttachmentRepository {
    conn: DatabaseConnection,
}

impl AttachmentRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn add(
        &self,
        ticket_id: i32,
        filename: &str,
        stored_ref: &str,
        mime: &str,
        size: i64,
        uploader_id: i32,
    ) -> Result<attachments::Model> {
        let active = attachments::ActiveModel {
            ticket_id: Set(ticket_id),
            filename: Set(filename.to_string()),
            stored_ref: Set(stored_ref.to_string()),
            mime: Set(mime.to_string()),
            size: Set(size),
            uploaded_at: Set(chrono::Utc::now().to_rfc3339()),
            uploader_id: Set(uploader_id),
            ..Default::default()
        };

        let model = active
            .insert(&self.conn)
            .await
            .context("Failed to insert attachment")?;

        Ok(model)
    }

    pub async fn get(&self, id: i32) -> Result<Option<attachments::Model>> {
        attachments::Entity::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query attachment by ID")
    }

    pub async fn list_for_ticket(&self, ticket_id: i32) -> Result<Vec<attachments::Model>> {
        attachments::Entity::find()
            .filter(attachments::Column::TicketId.eq(ticket_id))
            .order_by_desc(attachments::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list attachments for ticket")
    }
}
