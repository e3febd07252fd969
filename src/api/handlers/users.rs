use crate::api::error::AppError;
use crate::api::handlers::auth::{MessageResponse, UserView};
use crate::api::middleware::auth::Session;
use crate::entities::{prelude::*, users};
use crate::utils::auth::{hash_password, verify_password};
use axum::{Extension, Json, extract::State};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Serialize, ToSchema)]
pub struct ProfileResponse {
    pub user: UserView,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
}

#[derive(Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    #[validate(custom(function = "password_strength"))]
    pub new_password: String,
}

/// At least 8 characters mixing upper case, lower case, digits and symbols.
fn password_strength(password: &str) -> Result<(), validator::ValidationError> {
    let strong = password.chars().count() >= 8
        && password.chars().any(|c| c.is_uppercase())
        && password.chars().any(|c| c.is_lowercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| !c.is_alphanumeric());

    if strong {
        Ok(())
    } else {
        let mut err = validator::ValidationError::new("weak_password");
        err.message = Some(
            "Password must be at least 8 characters and include upper case, lower case, a digit and a special character"
                .into(),
        );
        Err(err)
    }
}

pub async fn current_user(
    db: &DatabaseConnection,
    session: &Session,
) -> Result<users::Model, AppError> {
    Users::find_by_id(session.user_id.clone())
        .one(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

#[utoipa::path(
    get,
    path = "/api/auth/getUser",
    responses(
        (status = 200, description = "Profile retrieved successfully", body = ProfileResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn get_user(
    State(state): State<crate::AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = current_user(&state.db, &session).await?;
    Ok(Json(ProfileResponse { user: user.into() }))
}

#[utoipa::path(
    put,
    path = "/api/auth/updateProfile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated successfully", body = ProfileResponse),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn update_profile(
    State(state): State<crate::AppState>,
    Extension(session): Extension<Session>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    payload.validate()?;

    let user = current_user(&state.db, &session).await?;
    let mut active: users::ActiveModel = user.into();
    active.name = Set(payload.name.trim().to_string());
    let updated = active.update(&state.db).await?;

    Ok(Json(ProfileResponse {
        user: updated.into(),
    }))
}

#[utoipa::path(
    put,
    path = "/api/auth/changePassword",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "New password too weak"),
        (status = 401, description = "Old password is wrong")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn change_password(
    State(state): State<crate::AppState>,
    Extension(session): Extension<Session>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let user = current_user(&state.db, &session).await?;

    if !verify_password(payload.old_password.clone(), user.password_hash.clone()).await? {
        return Err(AppError::Unauthorized("Old password is incorrect".to_string()));
    }

    payload.validate()?;

    let password_hash = hash_password(payload.new_password).await?;
    let mut active: users::ActiveModel = user.into();
    active.password_hash = Set(password_hash);
    active.update(&state.db).await?;

    tracing::info!("🔑 Password changed for user {}", session.email);

    Ok(MessageResponse::new("Password updated successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_strength() {
        assert!(password_strength("Str0ng!pw").is_ok());
        assert!(password_strength("short1!").is_err());
        assert!(password_strength("alllower1!").is_err());
        assert!(password_strength("NoDigits!!").is_err());
        assert!(password_strength("NoSymbol12").is_err());
    }
}
