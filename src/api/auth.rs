use axum::{
    Json,
    extract::{ConnectInfo, Request, State, rejection::ExtensionRejection},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_sessions::Session;

use super::{ApiError, ApiResponse, AppState, UserDto};
use crate::entities::users::Role;
use crate::services::Actor;

pub const SESSION_USER_KEY: &str = "user_id";

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user: Option<UserDto>,
}

// ============================================================================
// Middleware
// ============================================================================

/// The authenticated identity for the current request, loaded fresh from the
/// store so role changes take effect on the next request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i32,
    pub username: String,
    pub role: Role,
}

impl CurrentUser {
    #[must_use]
    pub const fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
        }
    }
}

/// Session gate for the protected routes. Resolves the session to a live
/// user row and hands it to handlers through request extensions.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user_id: Option<i32> = session
        .get(SESSION_USER_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    let Some(user_id) = user_id else {
        return Err(ApiError::Unauthorized("Authentication required".to_string()));
    };

    let Some(user) = state
        .store()
        .get_user(user_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to resolve session user: {e}")))?
    else {
        // Account deleted since login; the session is dead weight.
        let _ = session.flush().await;
        return Err(ApiError::Unauthorized("Authentication required".to_string()));
    };

    tracing::Span::current().record("user_id", user.id);

    request.extensions_mut().insert(CurrentUser {
        id: user.id,
        username: user.username,
        role: user.role,
    });

    Ok(next.run(request).await)
}

/// Throttle key for the credential endpoints: forwarded client address when
/// a proxy supplied one, socket peer otherwise.
#[must_use]
pub fn client_key(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
    {
        let first = first.trim();
        if !first.is_empty() {
            return first.to_string();
        }
    }

    peer.map_or_else(|| "unknown".to_string(), |info| info.0.ip().to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/register
/// Create an account with the default role
pub async fn register(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    if !state.throttle().try_acquire(&client_key(&headers, peer.as_ref().ok())) {
        return Err(ApiError::RateLimited);
    }

    let user = state
        .auth()
        .register(
            &payload.username,
            payload.email.as_deref(),
            &payload.password,
        )
        .await?;

    tracing::info!("Account registered: {}", user.username);

    Ok(Json(ApiResponse::success(UserDto::from(user))))
}

/// POST /api/login
/// Authenticate and establish a session
pub async fn login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    peer: Result<ConnectInfo<SocketAddr>, ExtensionRejection>,
    session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    if !state.throttle().try_acquire(&client_key(&headers, peer.as_ref().ok())) {
        return Err(ApiError::RateLimited);
    }

    if payload.username.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let user = state
        .auth()
        .login(&payload.username, &payload.password)
        .await?;

    session
        .insert(SESSION_USER_KEY, user.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;

    Ok(Json(ApiResponse::success(UserDto::from(user))))
}

/// POST /api/logout
/// Invalidate the current session
pub async fn logout(session: Session) -> impl IntoResponse {
    let _ = session.flush().await;
    Json(ApiResponse::success(super::MessageResponse {
        message: "Logged out".to_string(),
    }))
}

/// GET /api/me
/// Current identity, or null when no session is active
pub async fn me(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ApiResponse<MeResponse>>, ApiError> {
    let user_id: Option<i32> = session
        .get(SESSION_USER_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    let user = match user_id {
        Some(id) => state
            .store()
            .get_user(id)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to get user: {e}")))?,
        None => None,
    };

    Ok(Json(ApiResponse::success(MeResponse {
        user: user.map(UserDto::from),
    })))
}
