// Dashboard Service
// Purpose: Read-only composition of analyzer history, cache counters and engine
// statistics. Holds no state of its own; everything is recomputed per request.
// Catalog statistics are optional telemetry: read failures degrade to empty values.

use crate::models::{
    CacheStats, ConnectionPoolSnapshot, MonitorReport, PerformanceSummary, QueryAnalysisDetail,
    QueryPerformanceMetrics, SlowQuerySummary, TableActivity,
};
use crate::services::performance_monitor::PerformanceMonitor;
use crate::services::query_analyzer::QueryAnalyzer;
use crate::services::query_cache::QueryCache;
use crate::services::statistics::StatisticsSource;
use crate::utils::{ApiError, ApiResult};
use chrono::{Duration, Utc};
use std::sync::Arc;

/// Slow queries included in the performance summary
const SUMMARY_TOP_SLOW_QUERIES: usize = 5;

/// Query text longer than this is truncated in summaries
const MAX_QUERY_PREVIEW_CHARS: usize = 100;

fn truncate_query(query: &str) -> String {
    match query.char_indices().nth(MAX_QUERY_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &query[..idx]),
        None => query.to_string(),
    }
}

impl From<&QueryPerformanceMetrics> for SlowQuerySummary {
    fn from(m: &QueryPerformanceMetrics) -> Self {
        Self {
            query_id: m.query_id.clone(),
            query: truncate_query(&m.normalized_query),
            avg_execution_time_ms: m.avg_execution_time_ms,
            total_executions: m.total_executions,
            slowest_execution_ms: m.slowest_execution_ms,
            last_executed_at: m.last_executed_at,
        }
    }
}

pub struct DashboardService {
    analyzer: Arc<QueryAnalyzer>,
    cache: Arc<QueryCache>,
    statistics: Arc<dyn StatisticsSource>,
    monitor: Option<Arc<PerformanceMonitor>>,
}

impl DashboardService {
    pub fn new(
        analyzer: Arc<QueryAnalyzer>,
        cache: Arc<QueryCache>,
        statistics: Arc<dyn StatisticsSource>,
    ) -> Self {
        Self { analyzer, cache, statistics, monitor: None }
    }

    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// History entries executed within the last `window_hours`
    fn metrics_in_window(&self, window_hours: i64) -> Vec<QueryPerformanceMetrics> {
        let since = Utc::now() - Duration::hours(window_hours.max(0));
        self.analyzer
            .get_query_history()
            .into_iter()
            .filter(|m| m.last_executed_at >= since)
            .collect()
    }

    fn slowest_first(
        &self,
        metrics: Vec<QueryPerformanceMetrics>,
        limit: usize,
    ) -> Vec<SlowQuerySummary> {
        let threshold = self.analyzer.slow_query_threshold_ms();
        let mut slow: Vec<QueryPerformanceMetrics> = metrics
            .into_iter()
            .filter(|m| m.avg_execution_time_ms > threshold)
            .collect();
        slow.sort_by(|a, b| b.avg_execution_time_ms.total_cmp(&a.avg_execution_time_ms));
        slow.iter().take(limit).map(SlowQuerySummary::from).collect()
    }

    pub async fn get_performance_summary(&self, window_hours: i64) -> PerformanceSummary {
        let metrics = self.metrics_in_window(window_hours);
        let total_executions: u64 = metrics.iter().map(|m| m.total_executions).sum();
        let avg_execution_time_ms = if total_executions == 0 {
            0.0
        } else {
            metrics
                .iter()
                .map(|m| m.avg_execution_time_ms * m.total_executions as f64)
                .sum::<f64>()
                / total_executions as f64
        };

        let threshold = self.analyzer.slow_query_threshold_ms();
        let slow_query_count = metrics.iter().filter(|m| m.avg_execution_time_ms > threshold).count();
        let tracked_queries = metrics.len();
        let top_slow_queries = self.slowest_first(metrics, SUMMARY_TOP_SLOW_QUERIES);

        let cache = self.cache.get_stats();
        let connection_pool = self.get_connection_pool_metrics().await;

        PerformanceSummary {
            window_hours,
            tracked_queries,
            total_executions,
            slow_query_count,
            avg_execution_time_ms,
            cache_hit_rate: cache.hit_rate,
            cache,
            connection_pool,
            top_slow_queries,
            generated_at: Utc::now(),
        }
    }

    /// Slow statements executed within the window, slowest first
    pub fn get_slow_queries(&self, limit: usize, window_hours: i64) -> Vec<SlowQuerySummary> {
        self.slowest_first(self.metrics_in_window(window_hours), limit)
    }

    pub async fn get_connection_pool_metrics(&self) -> ConnectionPoolSnapshot {
        self.statistics.connection_pool().await.unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            ConnectionPoolSnapshot::default()
        })
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        self.cache.get_stats()
    }

    /// Tables ranked by combined read + write activity
    pub async fn get_top_tables(&self, limit: i64) -> Vec<TableActivity> {
        self.statistics.table_activity(limit.max(0)).await.unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            Vec::new()
        })
    }

    pub fn get_query_analysis(&self, query_id: &str) -> ApiResult<QueryAnalysisDetail> {
        self.analyzer
            .get_query_detail(query_id)
            .ok_or_else(|| ApiError::not_found(format!("Query {} not found", query_id)))
    }

    pub fn get_last_monitor_report(&self) -> Option<MonitorReport> {
        self.monitor.as_ref().and_then(|m| m.last_report())
    }
}
