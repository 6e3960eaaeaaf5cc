use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::CurrentUser;
use super::validation::{clamp_pagination, parse_priority, parse_status};
use super::{ApiError, ApiResponse, AppState, MessageResponse, TicketDto, TicketListResponse};
use crate::entities::tickets::TicketPriority;
use crate::services::TicketUpdate;

#[derive(Deserialize)]
pub struct CreateTicketRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub priority: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateTicketRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Deserialize)]
pub struct ListTicketsQuery {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub assigned_to: Option<i32>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Deserialize)]
pub struct AssignRequest {
    pub user_id: i32,
}

/// POST /api/tickets
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(payload): Json<CreateTicketRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TicketDto>>), ApiError> {
    let priority = match payload.priority.as_deref() {
        Some(value) => parse_priority(value)?,
        None => TicketPriority::Normal,
    };

    let ticket = state
        .tickets()
        .create(&user.actor(), &payload.title, &payload.description, priority)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(TicketDto::from(ticket))),
    ))
}

/// GET /api/tickets
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ListTicketsQuery>,
) -> Result<Json<ApiResponse<TicketListResponse>>, ApiError> {
    let status = query.status.as_deref().map(parse_status).transpose()?;
    let priority = query.priority.as_deref().map(parse_priority).transpose()?;
    let (page, size) = clamp_pagination(query.page, query.size);

    let (tickets, total) = state
        .tickets()
        .list(&user.actor(), status, priority, query.assigned_to, page, size)
        .await?;

    Ok(Json(ApiResponse::success(TicketListResponse {
        tickets: tickets.into_iter().map(TicketDto::from).collect(),
        total,
        page,
        size,
    })))
}

/// GET /api/tickets/{id}
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<TicketDto>>, ApiError> {
    let ticket = state.tickets().get(&user.actor(), id).await?;
    Ok(Json(ApiResponse::success(TicketDto::from(ticket))))
}

/// PUT /api/tickets/{id}
pub async fn update_ticket(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateTicketRequest>,
) -> Result<Json<ApiResponse<TicketDto>>, ApiError> {
    let update = TicketUpdate {
        title: payload.title,
        description: payload.description,
        priority: payload.priority.as_deref().map(parse_priority).transpose()?,
        status: payload.status.as_deref().map(parse_status).transpose()?,
    };

    let ticket = state.tickets().update(&user.actor(), id, update).await?;
    Ok(Json(ApiResponse::success(TicketDto::from(ticket))))
}

/// DELETE /api/tickets/{id}
pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.tickets().delete(&user.actor(), id).await?;
    Ok(Json(ApiResponse::success(MessageResponse {
        message: format!("Ticket {id} deleted"),
    })))
}

/// PUT /api/tickets/{id}/assign
pub async fn assign_ticket(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<ApiResponse<TicketDto>>, ApiError> {
    let ticket = state
        .tickets()
        .assign(&user.actor(), id, payload.user_id)
        .await?;
    Ok(Json(ApiResponse::success(TicketDto::from(ticket))))
}

/// PUT /api/tickets/{id}/close
pub async fn close_ticket(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<TicketDto>>, ApiError> {
    let ticket = state.tickets().close(&user.actor(), id).await?;
    Ok(Json(ApiResponse::success(TicketDto::from(ticket))))
}
