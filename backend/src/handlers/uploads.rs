//! Attachment upload handler

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use shared::{AttachmentCategory, DomainError, StoredFile};

use crate::error::{AppError, AppResult};
use crate::middleware::AuthUser;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    pub category: AttachmentCategory,
}

/// Store every file part of a multipart body and return the references.
/// The references are attached to transfers and queries by later calls.
pub async fn upload_files(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let max_bytes = state.config.storage.max_upload_bytes;
    let mut stored: Vec<StoredFile> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| DomainError::invalid("file", format!("malformed multipart body: {}", e)))?
    {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field
            .bytes()
            .await
            .map_err(|e| DomainError::invalid("file", format!("could not read upload: {}", e)))?;

        if bytes.len() > max_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "{} exceeds the {} byte upload limit",
                file_name, max_bytes
            )));
        }

        stored.push(state.file_store.store(query.category, &file_name, &bytes).await?);
    }

    if stored.is_empty() {
        return Err(DomainError::invalid("file", "no file parts in request").into());
    }

    tracing::info!(
        user_id = %user.user_id,
        category = query.category.as_str(),
        files = stored.len(),
        "attachments uploaded"
    );
    Ok((StatusCode::CREATED, Json(stored)))
}
