use crate::api::error::AppError;
use crate::api::handlers::auth::MessageResponse;
use crate::api::middleware::auth::Session;
use axum::{
    Extension, Json,
    extract::{Path, State},
};

#[utoipa::path(
    delete,
    path = "/api/auth/delete/{id}",
    params(
        ("id" = String, Path, description = "File ID")
    ),
    responses(
        (status = 200, description = "File deleted", body = MessageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "File not found")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn delete_file(
    State(state): State<crate::AppState>,
    Extension(session): Extension<Session>,
    Path(file_id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .file_service
        .delete_file(&session.user_id, &file_id)
        .await?;

    Ok(MessageResponse::new("File deleted"))
}
