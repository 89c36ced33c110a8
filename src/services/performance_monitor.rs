//! Performance Monitor
//!
//! Scheduled task that inspects the slowest statements in the analyzer history
//! and samples engine-wide statistics. Observational only: it logs warnings and
//! keeps the last report for the dashboard, and never throttles traffic.
//!
//! Each run:
//! 1. Takes the slow-query subset of the analyzer history
//! 2. Re-analyzes the top N slowest and logs a warning record for each
//! 3. Reads engine statistics, each independently (partial results are kept)
//! 4. Purges expired query-cache entries
//!
//! Runs are single-flight: a run requested while another is active is skipped.

use crate::models::{DatabaseStatistics, MonitorReport, SlowQueryWarning};
use crate::services::query_analyzer::QueryAnalyzer;
use crate::services::query_cache::QueryCache;
use crate::services::statistics::StatisticsSource;
use crate::utils::scheduled_executor::{ScheduledExecutor, ScheduledTask, ShutdownHandle};
use chrono::Utc;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Clears the running flag when a run ends, including when it is cancelled
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PerformanceMonitor {
    analyzer: Arc<QueryAnalyzer>,
    statistics: Arc<dyn StatisticsSource>,
    cache: Option<Arc<QueryCache>>,
    slow_query_threshold_ms: f64,
    top_n: usize,
    running: AtomicBool,
    last_report: RwLock<Option<MonitorReport>>,
}

impl PerformanceMonitor {
    pub fn new(
        analyzer: Arc<QueryAnalyzer>,
        statistics: Arc<dyn StatisticsSource>,
        top_n: usize,
    ) -> Self {
        let slow_query_threshold_ms = analyzer.slow_query_threshold_ms();
        Self {
            analyzer,
            statistics,
            cache: None,
            slow_query_threshold_ms,
            top_n,
            running: AtomicBool::new(false),
            last_report: RwLock::new(None),
        }
    }

    /// Purge expired entries of this cache on every run
    pub fn with_cache(mut self, cache: Arc<QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn last_report(&self) -> Option<MonitorReport> {
        self.last_report.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Perform one monitoring pass. Returns `None` when another pass is active.
    pub async fn run_once(&self) -> Option<MonitorReport> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            info!("Performance monitor run already in progress, skipping");
            return None;
        }
        let _guard = RunGuard(&self.running);

        let started_at = Utc::now();
        let start = Instant::now();
        info!("Starting performance monitor run...");

        let mut slow = self.analyzer.get_slow_queries(self.slow_query_threshold_ms);
        slow.sort_by(|a, b| b.avg_execution_time_ms.total_cmp(&a.avg_execution_time_ms));
        let slow_queries_inspected = slow.len();

        let mut warnings = Vec::new();
        for metrics in slow.into_iter().take(self.top_n) {
            let Some(sample) = self.analyzer.sample_query(&metrics.query_id) else {
                // evicted since the slow list was taken
                continue;
            };

            match self.analyzer.reanalyze_query(&sample).await {
                Ok(result) => {
                    warn!(
                        query_id = %metrics.query_id,
                        avg_execution_time_ms = metrics.avg_execution_time_ms,
                        performance_score = result.performance_score,
                        suggestion_count = result.suggestions.len(),
                        "Slow query detected"
                    );
                    warnings.push(SlowQueryWarning {
                        query_id: metrics.query_id,
                        avg_execution_time_ms: metrics.avg_execution_time_ms,
                        performance_score: result.performance_score,
                        suggestion_count: result.suggestions.len(),
                    });
                },
                Err(e) => {
                    warn!("Re-analysis of slow query {} failed: {}", metrics.query_id, e);
                },
            }
        }

        let statistics = self.collect_statistics().await;

        let expired_cache_entries = self.cache.as_ref().map(|c| c.purge_expired()).unwrap_or(0);

        let report = MonitorReport {
            slow_queries_inspected,
            warnings,
            statistics,
            expired_cache_entries,
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(
            "Performance monitor run completed: {} slow, {} warnings, {} statistics unavailable, {}ms",
            report.slow_queries_inspected,
            report.warnings.len(),
            report.statistics.unavailable.len(),
            report.duration_ms
        );

        *self.last_report.write().unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
        Some(report)
    }

    /// Read every engine statistic independently; failures are logged and
    /// leave the default value in place.
    async fn collect_statistics(&self) -> DatabaseStatistics {
        let mut stats = DatabaseStatistics::default();
        let limit = self.top_n as i64;

        match self.statistics.active_connections().await {
            Ok(v) => stats.active_connections = v,
            Err(e) => {
                warn!("{}", e);
                stats.unavailable.push(e.statistic().to_string());
            },
        }

        match self.statistics.cache_hit_ratio().await {
            Ok(v) => stats.cache_hit_ratio = v,
            Err(e) => {
                warn!("{}", e);
                stats.unavailable.push(e.statistic().to_string());
            },
        }

        match self.statistics.top_indexes(limit).await {
            Ok(v) => stats.top_indexes = v,
            Err(e) => {
                warn!("{}", e);
                stats.unavailable.push(e.statistic().to_string());
            },
        }

        stats.collected_at = Some(Utc::now());
        stats
    }

    async fn execute(&self) -> Result<(), anyhow::Error> {
        self.run_once().await;
        Ok(())
    }
}

impl ScheduledTask for PerformanceMonitor {
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>> {
        Box::pin(async move { self.execute().await })
    }
}

/// Start the monitor on a fixed interval
///
/// # Returns
/// Shutdown handle for stopping the task
pub fn start_performance_monitor(
    monitor: Arc<PerformanceMonitor>,
    interval_secs: u64,
) -> ShutdownHandle {
    let executor =
        ScheduledExecutor::new("performance-monitor", Duration::from_secs(interval_secs));
    let shutdown_handle = executor.shutdown_handle();

    tokio::spawn(async move {
        executor.start(monitor).await;
    });

    info!("Performance monitor started with interval: {}s", interval_secs);

    shutdown_handle
}
