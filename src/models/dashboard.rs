// Dashboard and telemetry models
// Purpose: Read-only aggregates returned by the dashboard endpoints

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Query cache counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub max_entries: usize,
    /// hits / (hits + misses), 0 when nothing was observed
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn compute_hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 { 0.0 } else { hits as f64 / total as f64 }
    }
}

/// Point-in-time connection counts read from the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConnectionPoolSnapshot {
    pub total_connections: i64,
    pub active_connections: i64,
    pub idle_connections: i64,
    pub waiting_requests: i64,
}

/// Per-index read counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IndexUsage {
    pub schema_name: String,
    pub table_name: String,
    pub index_name: String,
    pub reads: i64,
    pub tuples_read: i64,
}

/// Per-table read/write activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TableActivity {
    pub schema_name: String,
    pub table_name: String,
    pub reads: i64,
    pub writes: i64,
    pub total_activity: i64,
    pub size_bytes: i64,
}

/// Slow query entry as shown on the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SlowQuerySummary {
    pub query_id: String,
    pub query: String,
    pub avg_execution_time_ms: f64,
    pub total_executions: u64,
    pub slowest_execution_ms: f64,
    pub last_executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PerformanceSummary {
    pub window_hours: i64,
    pub tracked_queries: usize,
    pub total_executions: u64,
    pub slow_query_count: usize,
    pub avg_execution_time_ms: f64,
    pub cache_hit_rate: f64,
    pub cache: CacheStats,
    pub connection_pool: ConnectionPoolSnapshot,
    pub top_slow_queries: Vec<SlowQuerySummary>,
    pub generated_at: DateTime<Utc>,
}

/// Engine-wide statistics collected by one monitor run.
/// Each field is best-effort; failed reads leave the default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DatabaseStatistics {
    pub active_connections: i64,
    pub cache_hit_ratio: f64,
    pub top_indexes: Vec<IndexUsage>,
    /// Names of the statistics that could not be read
    pub unavailable: Vec<String>,
    pub collected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SlowQueryWarning {
    pub query_id: String,
    pub avg_execution_time_ms: f64,
    pub performance_score: u8,
    pub suggestion_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MonitorReport {
    pub slow_queries_inspected: usize,
    pub warnings: Vec<SlowQueryWarning>,
    pub statistics: DatabaseStatistics,
    pub expired_cache_entries: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Body of `POST /api/cache/invalidate`; `pattern` is a glob over cache keys
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct InvalidateCacheRequest {
    pub pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InvalidateCacheResponse {
    pub pattern: String,
    pub removed: usize,
}
