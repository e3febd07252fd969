mod common;

use axum::http::StatusCode;
use common::setup;
use excel_analytics::entities::{prelude::*, users};
use excel_analytics::utils::auth::create_jwt;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde_json::json;

#[tokio::test]
async fn test_register_and_login() {
    let app = setup().await;

    assert_eq!(
        app.register("Jo", "jo@x.com", "secret").await,
        StatusCode::CREATED
    );

    let (status, body) = app.login("jo@x.com", "secret").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["user"]["email"], "jo@x.com");
    assert_eq!(body["user"]["name"], "Jo");
    assert_eq!(body["user"]["isAdmin"], false);
    assert!(body["user"].get("passwordHash").is_none());

    let stored = Users::find()
        .filter(users::Column::Email.eq("jo@x.com"))
        .one(&app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(stored.password_hash, "secret");
    assert!(stored.password_hash.starts_with("$argon2"));
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let app = setup().await;

    assert_eq!(
        app.register("Jo", "jo@x.com", "secret").await,
        StatusCode::CREATED
    );
    assert_eq!(
        app.register("Jo Again", "JO@x.com", "another").await,
        StatusCode::CONFLICT
    );
}

#[tokio::test]
async fn test_register_rejects_invalid_input() {
    let app = setup().await;

    assert_eq!(
        app.register("Jo", "not-an-email", "secret").await,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        app.register("Jo", "jo@x.com", "123").await,
        StatusCode::BAD_REQUEST
    );
    assert_eq!(
        app.register("", "jo@x.com", "secret").await,
        StatusCode::BAD_REQUEST
    );
}

#[tokio::test]
async fn test_login_failures_share_one_message() {
    let app = setup().await;
    app.register("Jo", "jo@x.com", "secret").await;

    let (wrong_status, wrong_body) = app.login("jo@x.com", "wrong").await;
    let (unknown_status, unknown_body) = app.login("nobody@x.com", "secret").await;

    assert_eq!(wrong_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_body["error"], unknown_body["error"]);
}

#[tokio::test]
async fn test_token_grants_access_to_protected_routes() {
    let app = setup().await;
    let token = app.user("Jo", "jo@x.com").await;

    let (status, body) = app.json("POST", "/api/auth/verify", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "jo@x.com");

    let (status, body) = app.json("GET", "/api/auth/getUser", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], "Jo");
}

#[tokio::test]
async fn test_missing_or_invalid_token_is_rejected() {
    let app = setup().await;

    let (status, _) = app.json("GET", "/api/auth/getUser", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .json("GET", "/api/auth/getUser", Some("garbage.token.value"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let app = setup().await;
    app.register("Jo", "jo@x.com", "secret").await;

    let user = Users::find()
        .filter(users::Column::Email.eq("jo@x.com"))
        .one(&app.state.db)
        .await
        .unwrap()
        .unwrap();
    let expired = create_jwt(
        &user,
        &app.state.config.jwt_secret,
        chrono::Duration::minutes(-5),
    )
    .unwrap();

    let (status, _) = app.json("POST", "/api/auth/verify", Some(&expired), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_of_removed_account_is_rejected() {
    let app = setup().await;
    let token = app.user("Jo", "jo@x.com").await;

    Users::delete_many()
        .filter(users::Column::Email.eq("jo@x.com"))
        .exec(&app.state.db)
        .await
        .unwrap();

    let (status, _) = app.json("GET", "/api/auth/getUser", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_update_profile() {
    let app = setup().await;
    let token = app.user("Jo", "jo@x.com").await;

    let (status, body) = app
        .json(
            "PUT",
            "/api/auth/updateProfile",
            Some(&token),
            Some(json!({ "name": "Jo Smith" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], "Jo Smith");

    let (status, _) = app
        .json(
            "PUT",
            "/api/auth/updateProfile",
            Some(&token),
            Some(json!({ "name": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_change_password() {
    let app = setup().await;
    let token = app.user("Jo", "jo@x.com").await;

    let (status, _) = app
        .json(
            "PUT",
            "/api/auth/changePassword",
            Some(&token),
            Some(json!({ "oldPassword": "wrong", "newPassword": "N3w!Password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .json(
            "PUT",
            "/api/auth/changePassword",
            Some(&token),
            Some(json!({ "oldPassword": "secret", "newPassword": "weak" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .json(
            "PUT",
            "/api/auth/changePassword",
            Some(&token),
            Some(json!({ "oldPassword": "secret", "newPassword": "N3w!Password" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.login("jo@x.com", "secret").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.login("jo@x.com", "N3w!Password").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_health_and_security_headers() {
    let app = setup().await;

    let (status, headers, _) = app.get_raw("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert!(headers.contains_key("x-request-id"));
}
