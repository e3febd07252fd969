use crate::entities::{prelude::*, users};
use anyhow::{Result, anyhow};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

/// Sets the admin flag of the account registered under `email`.
pub async fn set_admin_by_email(
    db: &DatabaseConnection,
    email: &str,
    is_admin: bool,
) -> Result<users::Model> {
    let email = email.trim().to_lowercase();
    let user = Users::find()
        .filter(users::Column::Email.eq(&email))
        .one(db)
        .await?
        .ok_or_else(|| anyhow!("no user registered with email {}", email))?;

    let mut active: users::ActiveModel = user.into();
    active.is_admin = Set(is_admin);
    Ok(active.update(db).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::run_migrations;
    use sea_orm::Database;

    #[tokio::test]
    async fn test_set_admin_by_email() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        run_migrations(&db).await.unwrap();

        users::ActiveModel {
            id: Set("u1".to_string()),
            name: Set("Jo".to_string()),
            email: Set("jo@x.com".to_string()),
            password_hash: Set("x".to_string()),
            is_admin: Set(false),
            created_at: Set(chrono::Utc::now()),
        }
        .insert(&db)
        .await
        .unwrap();

        let user = set_admin_by_email(&db, " JO@x.com ", true).await.unwrap();
        assert!(user.is_admin);

        let user = set_admin_by_email(&db, "jo@x.com", false).await.unwrap();
        assert!(!user.is_admin);

        assert!(set_admin_by_email(&db, "nobody@x.com", true).await.is_err());
    }
}
