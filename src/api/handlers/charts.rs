use crate::api::error::AppError;
use crate::api::middleware::auth::Session;
use crate::services::charting::{ChartConfig, ChartData, build_chart};
use crate::services::spreadsheet::CellValue;
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};

const DEFAULT_TABLE_LIMIT: usize = 100;
const MAX_TABLE_LIMIT: usize = 5000;

#[derive(Deserialize)]
pub struct TableQuery {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableResponse {
    pub file_id: String,
    pub filename: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    pub total_rows: usize,
}

#[utoipa::path(
    get,
    path = "/api/auth/table/{id}",
    params(
        ("id" = String, Path, description = "File ID"),
        ("limit" = Option<usize>, Query, description = "Maximum number of rows (default 100)")
    ),
    responses(
        (status = 200, description = "Parsed spreadsheet: headers, rows and total row count"),
        (status = 400, description = "File cannot be parsed"),
        (status = 404, description = "File not found")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn get_table(
    State(state): State<crate::AppState>,
    Extension(session): Extension<Session>,
    Path(file_id): Path<String>,
    Query(query): Query<TableQuery>,
) -> Result<Json<TableResponse>, AppError> {
    let (file, table) = state
        .file_service
        .load_table(&session.user_id, &file_id)
        .await?;

    let limit = query
        .limit
        .unwrap_or(DEFAULT_TABLE_LIMIT)
        .min(MAX_TABLE_LIMIT);
    let total_rows = table.rows.len();
    let table = table.truncated(limit);

    Ok(Json(TableResponse {
        file_id: file.id,
        filename: file.filename,
        headers: table.headers,
        rows: table.rows,
        total_rows,
    }))
}

#[utoipa::path(
    post,
    path = "/api/auth/chart/{id}",
    params(
        ("id" = String, Path, description = "File ID")
    ),
    request_body(content = Object, description = "Chart configuration: chartType, xAxis, yAxis, zAxis, groupBy, aggregation"),
    responses(
        (status = 200, description = "Chart-ready labels and datasets"),
        (status = 400, description = "Unknown column or incomplete configuration"),
        (status = 404, description = "File not found")
    ),
    security(
        ("jwt" = [])
    )
)]
pub async fn chart_for_file(
    State(state): State<crate::AppState>,
    Extension(session): Extension<Session>,
    Path(file_id): Path<String>,
    Json(config): Json<ChartConfig>,
) -> Result<Json<ChartData>, AppError> {
    let (_, table) = state
        .file_service
        .load_table(&session.user_id, &file_id)
        .await?;

    Ok(Json(build_chart(&table, &config)?))
}
