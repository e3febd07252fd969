use crate::api::error::AppError;
use crate::api::middleware::auth::Session;
use axum::{
    Extension, Json,
    extract::{Multipart, State},
};
use futures::TryStreamExt;
use tokio_util::io::StreamReader;

use super::types::*;

#[utoipa::path(
    post,
    path = "/api/auth/upload",
    request_body(content = Multipart, description = "Spreadsheet in the `file` field (.xlsx, .xls or .csv)"),
    responses(
        (status = 200, description = "File uploaded successfully", body = UploadResponse),
        (status = 400, description = "Missing, empty or unreadable file"),
        (status = 401, description = "Unauthorized"),
        (status = 413, description = "File too large"),
        (status = 415, description = "Not a spreadsheet")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn upload_file(
    State(state): State<crate::AppState>,
    Extension(session): Extension<Session>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let result: Result<Json<UploadResponse>, AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(|e| {
            let err_msg = e.to_string();
            if err_msg.contains("length limit exceeded") {
                AppError::PayloadTooLarge(
                    "Request body exceeds the maximum allowed limit".to_string(),
                )
            } else {
                AppError::BadRequest(err_msg)
            }
        })? {
            if field.name() != Some("file") {
                continue;
            }

            let original_filename = field.file_name().unwrap_or("unnamed").to_string();
            let content_type = field.content_type().map(|s| s.to_string());

            let reader = StreamReader::new(field.map_err(std::io::Error::other));

            let file = state
                .file_service
                .upload_spreadsheet(
                    &session.user_id,
                    &original_filename,
                    content_type.as_deref(),
                    reader,
                )
                .await?;

            return Ok(Json(UploadResponse {
                message: "File uploaded successfully".to_string(),
                headers: file.header_names(),
                file_id: file.id,
                filename: file.filename,
            }));
        }

        Err(AppError::BadRequest("No file provided".to_string()))
    }
    .await;

    if let Err(e) = &result {
        // Drain the rest of the body so the client sees the error instead of a reset
        tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
        while let Ok(Some(mut field)) = multipart.next_field().await {
            while let Ok(Some(_)) = field.chunk().await {}
        }
    }

    result
}
