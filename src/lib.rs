pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::api::handlers::{admin, analysis, auth, charts, files, health, users};
use crate::api::middleware::{
    auth::{auth_middleware, require_admin},
    request_id::{REQUEST_ID_HEADER, access_log_middleware, request_id_middleware},
    security::security_headers,
};
use crate::config::AppConfig;
use crate::services::file_service::FileService;
use crate::services::storage::StorageService;
use axum::{
    Router,
    body::Body,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Request, Response, header},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::auth::register,
        api::handlers::auth::login,
        api::handlers::auth::verify,
        api::handlers::users::get_user,
        api::handlers::users::update_profile,
        api::handlers::users::change_password,
        api::handlers::files::upload_file,
        api::handlers::files::list_files,
        api::handlers::files::download_file,
        api::handlers::files::preview_file,
        api::handlers::files::delete_file,
        api::handlers::charts::get_table,
        api::handlers::charts::chart_for_file,
        api::handlers::analysis::save_analysis,
        api::handlers::analysis::get_visuals,
        api::handlers::analysis::get_analysis,
        api::handlers::analysis::analysis_chart,
        api::handlers::analysis::delete_analysis,
        api::handlers::admin::get_all_users,
        api::handlers::admin::give_admin,
        api::handlers::admin::revoke_admin,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::auth::RegisterRequest,
            api::handlers::auth::LoginRequest,
            api::handlers::auth::LoginResponse,
            api::handlers::auth::VerifyResponse,
            api::handlers::auth::UserView,
            api::handlers::auth::MessageResponse,
            api::handlers::users::ProfileResponse,
            api::handlers::users::UpdateProfileRequest,
            api::handlers::users::ChangePasswordRequest,
            api::handlers::files::UploadResponse,
            api::handlers::files::FileView,
            api::handlers::files::OwnerFiles,
            api::handlers::files::FilesResponse,
            api::handlers::analysis::SaveAnalysisResponse,
            api::handlers::analysis::AnalysisView,
            api::handlers::analysis::VisualsResponse,
            api::handlers::admin::AdminUserView,
            api::handlers::admin::UsersResponse,
            api::handlers::admin::AdminFlagRequest,
            api::handlers::health::HealthResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Accounts, files, charts and admin endpoints"),
        (name = "system", description = "Service health")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "jwt",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn StorageService>,
    pub file_service: Arc<FileService>,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(db: DatabaseConnection, storage: Arc<dyn StorageService>, config: AppConfig) -> Self {
        let file_service = Arc::new(FileService::new(db.clone(), storage.clone(), config.clone()));
        Self {
            db,
            storage,
            file_service,
            config,
        }
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            header::CONTENT_DISPOSITION,
            HeaderName::from_static("x-checksum-sha256"),
            HeaderName::from_static("x-request-id"),
        ]);

    if config.allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

/// Span wrapping one request; `x-request-id` is already assigned here.
pub fn request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    tracing::info_span!(
        "http_request",
        method = %request.method(),
        uri = %request.uri().path(),
        request_id = %request_id,
    )
}

pub fn create_app(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route("/getAllUsers", get(admin::get_all_users))
        .route("/giveAdmin", put(admin::give_admin))
        .route("/revokeAdmin", put(admin::revoke_admin))
        .route_layer(from_fn(require_admin));

    let protected_routes = Router::new()
        .route("/verify", post(auth::verify))
        .route("/getUser", get(users::get_user))
        .route("/updateProfile", put(users::update_profile))
        .route("/changePassword", put(users::change_password))
        .route("/upload", post(files::upload_file))
        .route("/getFiles", get(files::list_files))
        .route("/download/:id", get(files::download_file))
        .route("/preview/:id", get(files::preview_file))
        .route("/delete/:id", delete(files::delete_file))
        .route("/table/:id", get(charts::get_table))
        .route("/chart/:id", post(charts::chart_for_file))
        .route("/saveAnalysis", post(analysis::save_analysis))
        .route("/getVisuals", get(analysis::get_visuals))
        .route(
            "/analysis/:id",
            get(analysis::get_analysis).delete(analysis::delete_analysis),
        )
        .route("/analysis/:id/chart", get(analysis::analysis_chart))
        .route("/deleteVisual/:id", delete(analysis::delete_analysis))
        .merge(admin_routes)
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .merge(protected_routes);

    // Multipart framing needs a little room above the file limit
    let body_limit = state.config.max_file_size + 1024 * 1024;

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(health::health_check))
        .nest("/api/auth", auth_routes)
        .layer(from_fn(security_headers))
        .layer(from_fn(access_log_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(|response: &Response<Body>, latency: Duration, _span: &Span| {
                    tracing::debug!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                }),
        )
        // Outside the trace layer so the span sees the assigned id
        .layer(from_fn(request_id_middleware))
        .layer(cors_layer(&state.config))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
