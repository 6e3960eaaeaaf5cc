use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use super::auth::CurrentUser;
use super::validation::{clamp_pagination, parse_role};
use super::{ApiError, ApiResponse, AppState, UserDto};
use crate::services::{Action, Resource, authorize};

#[derive(Deserialize)]
pub struct ListUsersQuery {
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Deserialize)]
pub struct SetRoleRequest {
    pub role: String,
}

#[derive(Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserDto>,
    pub total: u64,
}

/// GET /api/users (admin)
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<ApiResponse<UserListResponse>>, ApiError> {
    if !authorize(&user.actor(), Action::ManageUsers, &Resource::Users) {
        return Err(ApiError::forbidden());
    }

    let (page, size) = clamp_pagination(query.page, query.size);
    let (users, total) = state
        .store()
        .list_users(page, size)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list users: {e}")))?;

    Ok(Json(ApiResponse::success(UserListResponse {
        users: users.into_iter().map(UserDto::from).collect(),
        total,
    })))
}

/// PUT /api/users/{id}/role (admin)
/// An admin may change any role, their own included.
pub async fn set_role(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<i32>,
    Json(payload): Json<SetRoleRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    if !authorize(&user.actor(), Action::ManageUsers, &Resource::Users) {
        return Err(ApiError::forbidden());
    }

    let role = parse_role(&payload.role)?;

    let updated = state
        .store()
        .set_user_role(id, role)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to change role: {e}")))?
        .ok_or_else(|| ApiError::not_found("User", id))?;

    if let Err(e) = state
        .store()
        .append_audit(
            Some(user.id),
            "role_change",
            "user",
            id,
            &format!("role={}", payload.role),
        )
        .await
    {
        warn!("Audit append failed for role_change on user {id}: {e}");
    }

    Ok(Json(ApiResponse::success(UserDto::from(updated))))
}
