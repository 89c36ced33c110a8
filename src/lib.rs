//! QueryLens Library
//!
//! Query performance analysis for PostgreSQL: execution-plan retrieval, rule-based
//! optimization suggestions, a TTL + LRU result cache, a scheduled performance
//! monitor and dashboard aggregates.

use std::sync::Arc;

pub mod config;
pub mod db;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use config::Config;
pub use services::{
    DashboardService, PerformanceMonitor, PgClient, PgPlanRetriever, PgStatisticsSource,
    QueryAnalyzer, QueryCache,
};

/// Application shared state
///
/// All services are wrapped in Arc for cheap cloning and thread safety.
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<QueryAnalyzer>,
    pub query_cache: Arc<QueryCache>,
    pub dashboard_service: Arc<DashboardService>,
}
