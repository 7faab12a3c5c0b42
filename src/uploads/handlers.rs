use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    middleware::from_fn_with_state,
    routing::{delete, post},
    Router,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    auth::middleware::require_auth,
    error::{AppError, AppJson, AppResult},
    state::AppState,
    storage::{validate_image, Category, StoredFile},
};

/// Room for a handful of max-size files plus multipart framing.
const BODY_LIMIT_FILES: u64 = 10;

#[derive(Debug, Serialize)]
pub struct UploadResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> UploadResponse<T> {
    fn ok(message: &str, data: Option<T>) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            data,
        }
    }
}

pub fn upload_routes(state: &AppState) -> Router<AppState> {
    let body_limit = state
        .storage
        .max_bytes()
        .saturating_mul(BODY_LIMIT_FILES)
        .saturating_add(1024 * 1024);
    Router::new()
        .route("/upload/image", post(upload_image))
        .route("/upload/multiple", post(upload_multiple))
        .route("/upload/image/:filename", delete(delete_image))
        .layer(DefaultBodyLimit::max(usize::try_from(body_limit).unwrap_or(usize::MAX)))
        .route_layer(from_fn_with_state(state.clone(), require_auth))
}

struct IncomingFile {
    name: String,
    body: Bytes,
}

/// Drains the form: files under `file_field`, plus the optional `category`.
async fn read_form(
    mut mp: Multipart,
    file_field: &str,
) -> AppResult<(Vec<IncomingFile>, Category)> {
    let mut files = Vec::new();
    let mut category = Category::Image;

    while let Some(field) = mp.next_field().await.map_err(|e| {
        warn!(error = %e, "unreadable multipart body");
        AppError::validation(format!("Invalid request data: {e}"))
    })? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "category" {
            let label = field.text().await.map_err(|e| {
                AppError::validation(format!("Invalid request data: {e}"))
            })?;
            category = Category::from_label(&label);
        } else if name == file_field || name == format!("{file_field}[]") {
            let original = field.file_name().unwrap_or_default().to_string();
            let body = field.bytes().await.map_err(|e| {
                AppError::validation(format!("Invalid request data: {e}"))
            })?;
            files.push(IncomingFile {
                name: original,
                body,
            });
        }
    }
    Ok((files, category))
}

#[instrument(skip(state, mp))]
pub async fn upload_image(
    State(state): State<AppState>,
    mp: Multipart,
) -> AppResult<AppJson<UploadResponse<StoredFile>>> {
    let (mut files, category) = read_form(mp, "file").await?;
    if files.is_empty() {
        return Err(AppError::validation("No file uploaded"));
    }
    let file = files.swap_remove(0);
    let stored = state
        .storage
        .put_image(&file.name, category, file.body)
        .await?;
    info!(filename = %stored.filename, size = stored.size, "image uploaded");
    Ok(AppJson(UploadResponse::ok(
        "File uploaded successfully",
        Some(stored),
    )))
}

#[instrument(skip(state, mp))]
pub async fn upload_multiple(
    State(state): State<AppState>,
    mp: Multipart,
) -> AppResult<AppJson<UploadResponse<Vec<StoredFile>>>> {
    let (files, category) = read_form(mp, "files").await?;
    if files.is_empty() {
        return Err(AppError::validation("No files uploaded"));
    }

    // Reject the batch before writing anything.
    let max_bytes = state.storage.max_bytes();
    for file in &files {
        validate_image(&file.name, file.body.len() as u64, max_bytes).map_err(|e| {
            AppError::validation(format!("failed to upload {}: {e}", file.name))
        })?;
    }

    let mut stored = Vec::with_capacity(files.len());
    for file in files {
        let result = state
            .storage
            .put_image(&file.name, category, file.body)
            .await
            .map_err(|e| match AppError::from(e) {
                AppError::Validation(m) => {
                    AppError::validation(format!("failed to upload {}: {m}", file.name))
                }
                other => other,
            })?;
        stored.push(result);
    }
    info!(count = stored.len(), "images uploaded");
    Ok(AppJson(UploadResponse::ok(
        "Files uploaded successfully",
        Some(stored),
    )))
}

#[instrument(skip(state))]
pub async fn delete_image(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> AppResult<AppJson<UploadResponse<()>>> {
    state.storage.delete_image(&filename).await?;
    info!(%filename, "image deleted");
    Ok(AppJson(UploadResponse::ok("File deleted successfully", None)))
}
