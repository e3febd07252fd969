use crate::api::error::AppError;
use crate::api::handlers::auth::MessageResponse;
use crate::api::middleware::auth::Session;
use crate::entities::{prelude::*, *};
use axum::{Extension, Json, extract::State};
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveModelTrait, EntityTrait, FromQueryResult, QueryOrder, QuerySelect, Set};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminUserView {
    pub id: String,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub file_count: i64,
}

#[derive(Serialize, ToSchema)]
pub struct UsersResponse {
    pub users: Vec<AdminUserView>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminFlagRequest {
    pub user_id: String,
}

#[derive(FromQueryResult)]
struct FileCount {
    user_id: String,
    count: i64,
}

#[utoipa::path(
    get,
    path = "/api/auth/getAllUsers",
    responses(
        (status = 200, description = "All users with their file counts", body = UsersResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin access required")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn get_all_users(
    State(state): State<crate::AppState>,
) -> Result<Json<UsersResponse>, AppError> {
    let users = Users::find()
        .order_by_asc(users::Column::CreatedAt)
        .all(&state.db)
        .await?;

    let counts: HashMap<String, i64> = UserFiles::find()
        .select_only()
        .column(user_files::Column::UserId)
        .column_as(Expr::col(user_files::Column::Id).count(), "count")
        .group_by(user_files::Column::UserId)
        .into_model::<FileCount>()
        .all(&state.db)
        .await?
        .into_iter()
        .map(|c| (c.user_id, c.count))
        .collect();

    let users = users
        .into_iter()
        .map(|user| AdminUserView {
            file_count: counts.get(&user.id).copied().unwrap_or(0),
            id: user.id,
            name: user.name,
            email: user.email,
            is_admin: user.is_admin,
            created_at: user.created_at,
        })
        .collect();

    Ok(Json(UsersResponse { users }))
}

async fn set_admin_flag(
    state: &crate::AppState,
    session: &Session,
    user_id: &str,
    is_admin: bool,
) -> Result<users::Model, AppError> {
    if !is_admin && session.user_id == user_id {
        return Err(AppError::BadRequest(
            "You cannot revoke your own admin rights".to_string(),
        ));
    }

    let user = Users::find_by_id(user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let mut active: users::ActiveModel = user.into();
    active.is_admin = Set(is_admin);
    let updated = active.update(&state.db).await?;

    tracing::info!(
        "🛡️ {} set admin={} for {}",
        session.email,
        is_admin,
        updated.email
    );

    Ok(updated)
}

#[utoipa::path(
    put,
    path = "/api/auth/giveAdmin",
    request_body = AdminFlagRequest,
    responses(
        (status = 200, description = "Admin rights granted", body = MessageResponse),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "User not found")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn give_admin(
    State(state): State<crate::AppState>,
    Extension(session): Extension<Session>,
    Json(payload): Json<AdminFlagRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let user = set_admin_flag(&state, &session, &payload.user_id, true).await?;
    Ok(MessageResponse::new(format!("{} is now an admin", user.email)))
}

#[utoipa::path(
    put,
    path = "/api/auth/revokeAdmin",
    request_body = AdminFlagRequest,
    responses(
        (status = 200, description = "Admin rights revoked", body = MessageResponse),
        (status = 400, description = "Cannot revoke your own rights"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "User not found")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn revoke_admin(
    State(state): State<crate::AppState>,
    Extension(session): Extension<Session>,
    Json(payload): Json<AdminFlagRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let user = set_admin_flag(&state, &session, &payload.user_id, false).await?;
    Ok(MessageResponse::new(format!(
        "{} is no longer an admin",
        user.email
    )))
}
