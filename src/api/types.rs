use serde::Serialize;

use crate::db::User;
use crate::entities::users::Role;
use crate::entities::{attachments, audit_log, tickets};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UserDto {
    pub id: i32,
    pub username: String,
    pub email: Option<String>,
    pub role: Role,
    pub created_at: String,
}

impl From<User> for UserDto {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TicketDto {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub status: tickets::TicketStatus,
    pub priority: tickets::TicketPriority,
    pub created_at: String,
    pub updated_at: String,
    pub assigned_to: Option<i32>,
    pub user_id: i32,
}

impl From<tickets::Model> for TicketDto {
    fn from(model: tickets::Model) -> Self {
        Self {
            id: model.id,
            title: model.title,
            description: model.description,
            status: model.status,
            priority: model.priority,
            created_at: model.created_at,
            updated_at: model.updated_at,
            assigned_to: model.assigned_to,
            user_id: model.user_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TicketListResponse {
    pub tickets: Vec<TicketDto>,
    pub total: u64,
    pub page: u64,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct AttachmentDto {
    pub id: i32,
    pub ticket_id: i32,
    pub filename: String,
    pub url: String,
    pub mime: String,
    pub size: i64,
    pub uploaded_at: String,
    pub uploader_id: i32,
}

impl AttachmentDto {
    #[must_use]
    pub fn from_model(model: attachments::Model, url: String) -> Self {
        Self {
            id: model.id,
            ticket_id: model.ticket_id,
            filename: model.filename,
            url,
            mime: model.mime,
            size: model.size,
            uploaded_at: model.uploaded_at,
            uploader_id: model.uploader_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditEntryDto {
    pub id: i64,
    pub ts: String,
    pub actor_id: Option<i32>,
    pub action: String,
    pub entity: String,
    pub entity_id: i32,
    pub details: String,
}

impl From<audit_log::Model> for AuditEntryDto {
    fn from(model: audit_log::Model) -> Self {
        Self {
            id: model.id,
            ts: model.ts,
            actor_id: model.actor_id,
            action: model.action,
            entity: model.entity,
            entity_id: model.entity_id,
            details: model.details,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuditListResponse {
    pub entries: Vec<AuditEntryDto>,
    pub total: u64,
    pub page: u64,
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
