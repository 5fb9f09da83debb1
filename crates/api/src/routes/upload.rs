//! File upload endpoint
//!
//! Stores attachments under the configured upload directory and hands back
//! the `/static/...` URL the widget embeds in a message.

use axum::{
    extract::{Multipart, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

/// Accept one multipart `file` field, store it under a random name preserving
/// the original extension, and return its public URL.
pub async fn upload_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let extension = field
            .file_name()
            .and_then(|name| std::path::Path::new(name).extension())
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_default();

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {e}")))?;

        let stored_name = format!("{}{}", Uuid::new_v4(), extension);
        let path = std::path::Path::new(&state.config.upload_dir).join(&stored_name);
        tokio::fs::write(&path, &data).await.map_err(|e| {
            tracing::error!(error = %e, path = %path.display(), "Failed to write upload");
            ApiError::Internal
        })?;

        tracing::info!(file = %stored_name, bytes = data.len(), "Stored upload");
        return Ok(Json(UploadResponse {
            url: format!("/static/{stored_name}"),
        }));
    }

    Err(ApiError::BadRequest("missing 'file' field".to_string()))
}
