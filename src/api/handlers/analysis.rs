use crate::api::error::AppError;
use crate::api::handlers::auth::MessageResponse;
use crate::api::middleware::auth::Session;
use crate::entities::{prelude::*, *};
use crate::services::charting::{ChartConfig, ChartData, build_chart};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveAnalysisRequest {
    pub file_id: String,
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    #[serde(flatten)]
    pub config: ChartConfig,
    #[serde(default)]
    pub selected_fields: Vec<String>,
}

#[derive(Serialize, ToSchema)]
pub struct SaveAnalysisResponse {
    pub message: String,
    pub id: String,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisView {
    pub id: String,
    pub file_id: String,
    pub title: String,
    pub chart_type: String,
    pub x_axis: String,
    pub y_axis: String,
    pub z_axis: Option<String>,
    pub group_by: Option<String>,
    pub aggregation: String,
    pub selected_fields: Vec<String>,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<analyses::Model> for AnalysisView {
    fn from(analysis: analyses::Model) -> Self {
        Self {
            selected_fields: serde_json::from_value(analysis.selected_fields).unwrap_or_default(),
            id: analysis.id,
            file_id: analysis.file_id,
            title: analysis.title,
            chart_type: analysis.chart_type,
            x_axis: analysis.x_axis,
            y_axis: analysis.y_axis,
            z_axis: analysis.z_axis,
            group_by: analysis.group_by,
            aggregation: analysis.aggregation,
            created_at: analysis.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct VisualsResponse {
    pub visuals: Vec<AnalysisView>,
}

fn stored_config(analysis: &analyses::Model) -> Result<ChartConfig, AppError> {
    Ok(ChartConfig {
        chart_type: analysis.chart_type.parse()?,
        x_axis: analysis.x_axis.clone(),
        y_axis: analysis.y_axis.clone(),
        z_axis: analysis.z_axis.clone(),
        group_by: analysis.group_by.clone(),
        aggregation: analysis.aggregation.parse()?,
    })
}

async fn find_owned(
    state: &crate::AppState,
    session: &Session,
    id: &str,
) -> Result<analyses::Model, AppError> {
    Analyses::find_by_id(id)
        .filter(analyses::Column::UserId.eq(&session.user_id))
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Analysis not found".to_string()))
}

#[utoipa::path(
    post,
    path = "/api/auth/saveAnalysis",
    request_body(content = Object, description = "fileId, title, chartType, xAxis, yAxis, zAxis, groupBy, aggregation, selectedFields"),
    responses(
        (status = 201, description = "Analysis saved", body = SaveAnalysisResponse),
        (status = 400, description = "Invalid title or unknown column"),
        (status = 404, description = "File not found")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn save_analysis(
    State(state): State<crate::AppState>,
    Extension(session): Extension<Session>,
    Json(payload): Json<SaveAnalysisRequest>,
) -> Result<(StatusCode, Json<SaveAnalysisResponse>), AppError> {
    payload.validate()?;

    let file = state
        .file_service
        .find_owned(&session.user_id, &payload.file_id)
        .await?;

    let headers = file.header_names();
    payload.config.validate(&headers)?;
    if let Some(unknown) = payload
        .selected_fields
        .iter()
        .find(|field| !headers.contains(field))
    {
        return Err(AppError::BadRequest(format!("Unknown column: {}", unknown)));
    }

    let config = payload.config;
    let analysis = analyses::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        user_id: Set(session.user_id.clone()),
        file_id: Set(file.id),
        title: Set(payload.title.trim().to_string()),
        chart_type: Set(config.chart_type.as_str().to_string()),
        x_axis: Set(config.x_axis),
        y_axis: Set(config.y_axis),
        z_axis: Set(config.z_axis),
        group_by: Set(config.group_by),
        aggregation: Set(config.aggregation.as_str().to_string()),
        selected_fields: Set(serde_json::json!(payload.selected_fields)),
        created_at: Set(Utc::now()),
    }
    .insert(&state.db)
    .await?;

    tracing::info!("📈 Saved analysis '{}' for user {}", analysis.title, session.user_id);

    Ok((
        StatusCode::CREATED,
        Json(SaveAnalysisResponse {
            message: "Analysis saved".to_string(),
            id: analysis.id,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/api/auth/getVisuals",
    responses(
        (status = 200, description = "Saved analyses, newest first", body = VisualsResponse),
        (status = 401, description = "Unauthorized")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn get_visuals(
    State(state): State<crate::AppState>,
    Extension(session): Extension<Session>,
) -> Result<Json<VisualsResponse>, AppError> {
    let visuals = Analyses::find()
        .filter(analyses::Column::UserId.eq(&session.user_id))
        .order_by_desc(analyses::Column::CreatedAt)
        .all(&state.db)
        .await?
        .into_iter()
        .map(AnalysisView::from)
        .collect();

    Ok(Json(VisualsResponse { visuals }))
}

#[utoipa::path(
    get,
    path = "/api/auth/analysis/{id}",
    params(
        ("id" = String, Path, description = "Analysis ID")
    ),
    responses(
        (status = 200, description = "Saved analysis", body = AnalysisView),
        (status = 404, description = "Analysis not found")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn get_analysis(
    State(state): State<crate::AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisView>, AppError> {
    let analysis = find_owned(&state, &session, &id).await?;
    Ok(Json(analysis.into()))
}

#[utoipa::path(
    get,
    path = "/api/auth/analysis/{id}/chart",
    params(
        ("id" = String, Path, description = "Analysis ID")
    ),
    responses(
        (status = 200, description = "Analysis rendered against its file"),
        (status = 404, description = "Analysis not found")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn analysis_chart(
    State(state): State<crate::AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Json<ChartData>, AppError> {
    let analysis = find_owned(&state, &session, &id).await?;
    let config = stored_config(&analysis)?;

    let (_, table) = state
        .file_service
        .load_table(&session.user_id, &analysis.file_id)
        .await?;

    Ok(Json(build_chart(&table, &config)?))
}

#[utoipa::path(
    delete,
    path = "/api/auth/analysis/{id}",
    params(
        ("id" = String, Path, description = "Analysis ID")
    ),
    responses(
        (status = 200, description = "Analysis deleted", body = MessageResponse),
        (status = 404, description = "Analysis not found")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn delete_analysis(
    State(state): State<crate::AppState>,
    Extension(session): Extension<Session>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    let analysis = find_owned(&state, &session, &id).await?;
    Analyses::delete_by_id(analysis.id).exec(&state.db).await?;

    Ok(MessageResponse::new("Analysis deleted"))
}
