use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::{ApiError, ApiResponse, AppState, AttachmentDto};
use crate::services::blob::is_safe_key;

/// POST /api/tickets/{id}/attachments
/// Multipart upload; the body limit has already been applied by the router.
pub async fn upload_attachment(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(ticket_id): Path<i32>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ApiResponse<AttachmentDto>>), ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Malformed multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .map(ToString::to_string)
                .ok_or_else(|| ApiError::validation("Missing filename"))?;
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::validation(format!("Failed to read upload: {e}")))?;
            file = Some((filename, bytes.to_vec()));
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| ApiError::validation("Missing file field in upload"))?;

    if bytes.is_empty() {
        return Err(ApiError::validation("Uploaded file is empty"));
    }

    let attachment = state
        .attachments()
        .upload(&user.actor(), ticket_id, &filename, &bytes)
        .await?;

    let url = format!("/uploads/{}", attachment.stored_ref);

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(AttachmentDto::from_model(
            attachment, url,
        ))),
    ))
}

/// GET /api/tickets/{id}/attachments
pub async fn list_attachments(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(ticket_id): Path<i32>,
) -> Result<Json<ApiResponse<Vec<AttachmentDto>>>, ApiError> {
    let rows = state.attachments().list(&user.actor(), ticket_id).await?;

    let dtos = rows
        .into_iter()
        .map(|(model, url)| AttachmentDto::from_model(model, url))
        .collect();

    Ok(Json(ApiResponse::success(dtos)))
}

/// GET /uploads/{name}
/// Session-gated raw file fetch. The name is checked against traversal
/// shapes before it goes anywhere near storage.
pub async fn serve_upload(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<CurrentUser>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    if !is_safe_key(&name) {
        return Err(ApiError::validation("Invalid file name"));
    }

    let bytes = state
        .attachments()
        .open(&name)
        .await?
        .ok_or_else(|| ApiError::not_found("File", &name))?;

    let mime = mime_guess::from_path(&name).first_or_octet_stream();

    Ok((
        [(header::CONTENT_TYPE, mime.to_string())],
        bytes,
    )
        .into_response())
}
