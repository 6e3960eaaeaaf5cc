use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::CurrentUser;
use super::validation::clamp_pagination;
use super::{ApiError, ApiResponse, AppState, AuditEntryDto, AuditListResponse};
use crate::services::{Action, Resource, authorize};

#[derive(Deserialize)]
pub struct AuditQuery {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub entity: Option<String>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// GET /api/audit (tech/admin)
pub async fn list_audit(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<ApiResponse<AuditListResponse>>, ApiError> {
    if !authorize(&user.actor(), Action::ListAudit, &Resource::AuditTrail) {
        return Err(ApiError::forbidden());
    }

    let (page, size) = clamp_pagination(query.page, query.size);

    let (entries, total) = state
        .store()
        .list_audit(query.action, query.entity, page, size)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list audit entries: {e}")))?;

    Ok(Json(ApiResponse::success(AuditListResponse {
        entries: entries.into_iter().map(AuditEntryDto::from).collect(),
        total,
        page,
        size,
    })))
}
