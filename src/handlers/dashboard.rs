use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use crate::models::{
    CacheStats, ConnectionPoolSnapshot, MonitorReport, PerformanceSummary, QueryAnalysisDetail,
    SlowQuerySummary, TableActivity,
};
use crate::utils::{ApiError, ApiResult};

/// Upper bound on any `limit` parameter
const MAX_LIMIT: i64 = 1000;

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    #[serde(default = "default_hours")]
    pub hours: i64,
}

#[derive(Debug, Deserialize)]
pub struct SlowQueryParams {
    #[serde(default = "default_slow_query_limit")]
    pub limit: i64,
    #[serde(default = "default_hours")]
    pub hours: i64,
}

#[derive(Debug, Deserialize)]
pub struct TopTablesParams {
    #[serde(default = "default_table_limit")]
    pub limit: i64,
}

fn default_hours() -> i64 {
    24
}
fn default_slow_query_limit() -> i64 {
    50
}
fn default_table_limit() -> i64 {
    10
}

fn validate_hours(hours: i64) -> ApiResult<i64> {
    if hours <= 0 {
        return Err(ApiError::validation_error("hours must be a positive number"));
    }
    Ok(hours)
}

fn validate_limit(limit: i64) -> ApiResult<i64> {
    if limit <= 0 {
        return Err(ApiError::validation_error("limit must be a positive number"));
    }
    Ok(limit.min(MAX_LIMIT))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/summary",
    params(
        ("hours" = Option<i64>, Query, description = "Look-back window in hours (default 24)")
    ),
    responses(
        (status = 200, description = "Aggregated performance summary", body = PerformanceSummary),
        (status = 400, description = "Invalid window")
    ),
    tag = "Dashboard"
)]
pub async fn get_performance_summary(
    State(state): State<Arc<crate::AppState>>,
    Query(params): Query<SummaryParams>,
) -> ApiResult<Json<PerformanceSummary>> {
    let hours = validate_hours(params.hours)?;
    Ok(Json(state.dashboard_service.get_performance_summary(hours).await))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/slow-queries",
    params(
        ("limit" = Option<i64>, Query, description = "Maximum entries (default 50)"),
        ("hours" = Option<i64>, Query, description = "Look-back window in hours (default 24)")
    ),
    responses(
        (status = 200, description = "Slow queries, slowest first", body = Vec<SlowQuerySummary>),
        (status = 400, description = "Invalid limit or window")
    ),
    tag = "Dashboard"
)]
pub async fn get_slow_queries(
    State(state): State<Arc<crate::AppState>>,
    Query(params): Query<SlowQueryParams>,
) -> ApiResult<Json<Vec<SlowQuerySummary>>> {
    let limit = validate_limit(params.limit)?;
    let hours = validate_hours(params.hours)?;
    Ok(Json(state.dashboard_service.get_slow_queries(limit as usize, hours)))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/connections",
    responses(
        (status = 200, description = "Connection counts reported by the database", body = ConnectionPoolSnapshot)
    ),
    tag = "Dashboard"
)]
pub async fn get_connection_pool_metrics(
    State(state): State<Arc<crate::AppState>>,
) -> ApiResult<Json<ConnectionPoolSnapshot>> {
    Ok(Json(state.dashboard_service.get_connection_pool_metrics().await))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/cache",
    responses((status = 200, description = "Query cache counters", body = CacheStats)),
    tag = "Dashboard"
)]
pub async fn get_cache_stats(
    State(state): State<Arc<crate::AppState>>,
) -> ApiResult<Json<CacheStats>> {
    Ok(Json(state.dashboard_service.get_cache_stats()))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/top-tables",
    params(
        ("limit" = Option<i64>, Query, description = "Maximum tables (default 10)")
    ),
    responses(
        (status = 200, description = "Busiest tables by read + write activity", body = Vec<TableActivity>),
        (status = 400, description = "Invalid limit")
    ),
    tag = "Dashboard"
)]
pub async fn get_top_tables(
    State(state): State<Arc<crate::AppState>>,
    Query(params): Query<TopTablesParams>,
) -> ApiResult<Json<Vec<TableActivity>>> {
    let limit = validate_limit(params.limit)?;
    Ok(Json(state.dashboard_service.get_top_tables(limit).await))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/queries/{query_id}",
    params(
        ("query_id" = String, Path, description = "Statement shape identifier")
    ),
    responses(
        (status = 200, description = "Metrics and latest analysis", body = QueryAnalysisDetail),
        (status = 404, description = "Query not tracked")
    ),
    tag = "Dashboard"
)]
pub async fn get_query_analysis(
    State(state): State<Arc<crate::AppState>>,
    Path(query_id): Path<String>,
) -> ApiResult<Json<QueryAnalysisDetail>> {
    let detail = state.dashboard_service.get_query_analysis(&query_id)?;
    Ok(Json(detail))
}

#[utoipa::path(
    get,
    path = "/api/dashboard/monitor",
    responses(
        (status = 200, description = "Report of the last completed monitor run", body = MonitorReport),
        (status = 404, description = "No monitor run has completed")
    ),
    tag = "Dashboard"
)]
pub async fn get_monitor_report(
    State(state): State<Arc<crate::AppState>>,
) -> ApiResult<Json<MonitorReport>> {
    state
        .dashboard_service
        .get_last_monitor_report()
        .map(Json)
        .ok_or_else(|| ApiError::not_found("No monitor run has completed yet"))
}
