//! ETL run-log listing

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use govcon_common::db::{recent_loads, LoadLogRecord};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 500;

#[derive(Debug, Deserialize)]
pub struct LoadLogQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LoadLogsResponse {
    pub limit: i64,
    pub loads: Vec<LoadLogRecord>,
}

/// GET /api/load-logs?limit=N
///
/// Newest first. Limits above the maximum are clamped; zero or negative
/// limits are rejected.
pub async fn list_load_logs(
    State(state): State<AppState>,
    query: Result<Query<LoadLogQuery>, QueryRejection>,
) -> ApiResult<Json<LoadLogsResponse>> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let limit = match query.limit {
        None => DEFAULT_LIMIT,
        Some(n) if n < 1 => {
            return Err(ApiError::BadRequest(format!("limit must be at least 1, got {}", n)))
        }
        Some(n) => n.min(MAX_LIMIT),
    };

    let loads = recent_loads(&state.db, limit).await?;
    Ok(Json(LoadLogsResponse { limit, loads }))
}
