use crate::api::error::AppError;
use crate::api::handlers::users::current_user;
use crate::api::middleware::auth::Session;
use axum::{Extension, Json, extract::State};

use super::types::*;

#[utoipa::path(
    get,
    path = "/api/auth/getFiles",
    responses(
        (status = 200, description = "The requester's files in upload order", body = FilesResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn list_files(
    State(state): State<crate::AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<FilesResponse>, AppError> {
    let user = current_user(&state.db, &session).await?;
    let files = state.file_service.list_files(&user.id).await?;

    Ok(Json(FilesResponse {
        user: OwnerFiles {
            id: user.id,
            name: user.name,
            email: user.email,
            is_admin: user.is_admin,
            uploaded_files: files.into_iter().map(FileView::from).collect(),
        },
    }))
}
