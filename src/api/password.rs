use axum::{
    Json,
    extract::{ConnectInfo, State, rejection::ExtensionRejection},
    http::HeaderMap,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

use super::auth::client_key;
use super::{ApiError, ApiResponse, AppState, MessageResponse};

#[derive(Deserialize)]
pub struct RequestResetRequest {
    pub username: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

/// POST /api/password/request
/// Always answers the same way so usernames cannot be probed.
pub async fn request_reset(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
    Json(payload): Json<RequestResetRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    if !state.throttle().try_acquire(&client_key(&headers, peer.as_ref().ok())) {
        return Err(ApiError::RateLimited);
    }

    state.auth().request_password_reset(&payload.username).await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "If the account exists, a reset link has been sent".to_string(),
    })))
}

/// POST /api/password/reset
pub async fn reset(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state
        .auth()
        .reset_password(&payload.token, &payload.new_password)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Password updated".to_string(),
    })))
}
