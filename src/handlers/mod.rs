pub mod cache;
pub mod dashboard;
pub mod queries;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use crate::AppState;

/// Every `/api` route, bound to the shared state
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        // Dashboard
        .route("/api/dashboard/summary", get(dashboard::get_performance_summary))
        .route("/api/dashboard/slow-queries", get(dashboard::get_slow_queries))
        .route("/api/dashboard/connections", get(dashboard::get_connection_pool_metrics))
        .route("/api/dashboard/cache", get(dashboard::get_cache_stats))
        .route("/api/dashboard/top-tables", get(dashboard::get_top_tables))
        .route("/api/dashboard/queries/:query_id", get(dashboard::get_query_analysis))
        .route("/api/dashboard/monitor", get(dashboard::get_monitor_report))
        // Queries
        .route("/api/queries/analyze", post(queries::analyze_query))
        // Cache
        .route("/api/cache/invalidate", post(cache::invalidate_cache))
        .with_state(state)
}
