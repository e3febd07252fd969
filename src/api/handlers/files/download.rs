use crate::api::error::AppError;
use crate::api::middleware::auth::Session;
use axum::{
    Extension,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::Response,
};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use tokio_util::io::ReaderStream;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Disposition {
    Attachment,
    Inline,
}

/// `Content-Disposition` with an ASCII fallback name and the exact UTF-8
/// name in `filename*`.
pub(crate) fn content_disposition(disposition: Disposition, filename: &str) -> String {
    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .take(64)
        .collect::<String>();
    let fallback_filename = if ascii_filename.is_empty() {
        "file"
    } else {
        &ascii_filename
    };

    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    let disposition_type = match disposition {
        Disposition::Attachment => "attachment",
        Disposition::Inline => "inline",
    };

    format!(
        "{}; filename=\"{}\"; filename*=UTF-8''{}",
        disposition_type, fallback_filename, encoded_filename
    )
}

async fn stream_file(
    state: &crate::AppState,
    session: &Session,
    file_id: &str,
    disposition: Disposition,
) -> Result<Response, AppError> {
    let (file, reader) = state
        .file_service
        .open_file(&session.user_id, file_id)
        .await?;

    tracing::info!(
        "📎 Streaming file_id={} user={} ({:?})",
        file.id,
        session.user_id,
        disposition
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, file.content_type.as_str())
        .header(header::CONTENT_LENGTH, file.size)
        .header(
            header::CONTENT_DISPOSITION,
            content_disposition(disposition, &file.filename),
        )
        .header("X-Checksum-Sha256", file.checksum.as_str())
        .header(header::CACHE_CONTROL, "private, no-store")
        .body(Body::from_stream(ReaderStream::new(reader)))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
}

#[utoipa::path(
    get,
    path = "/api/auth/download/{id}",
    params(
        ("id" = String, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File download stream"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "File not found")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn download_file(
    State(state): State<crate::AppState>,
    Extension(session): Extension<Session>,
    Path(file_id): Path<String>,
) -> Result<Response, AppError> {
    stream_file(&state, &session, &file_id, Disposition::Attachment).await
}

#[utoipa::path(
    get,
    path = "/api/auth/preview/{id}",
    params(
        ("id" = String, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File shown inline"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "File not found")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn preview_file(
    State(state): State<crate::AppState>,
    Extension(session): Extension<Session>,
    Path(file_id): Path<String>,
) -> Result<Response, AppError> {
    stream_file(&state, &session, &file_id, Disposition::Inline).await
}
