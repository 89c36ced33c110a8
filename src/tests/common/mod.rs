// Common test utilities and in-memory fakes for the database-facing seams

use crate::AppState;
use crate::config::AnalyzerConfig;
use crate::models::{ConnectionPoolSnapshot, ExecutionPlanNode, IndexUsage, TableActivity};
use crate::services::plan_retriever::{PlanRetrievalError, PlanRetriever};
use crate::services::statistics::{StatisticsError, StatisticsResult, StatisticsSource};
use crate::services::{DashboardService, PerformanceMonitor, QueryAnalyzer, QueryCache, QueryExecutor};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Plan of `SELECT ... FROM users` without an index
pub fn users_seq_scan() -> ExecutionPlanNode {
    ExecutionPlanNode::new("Seq Scan", 1500.0, 100_000).with_relation("users")
}

pub fn users_index_scan() -> ExecutionPlanNode {
    let mut node = ExecutionPlanNode::new("Index Scan", 8.3, 1).with_relation("users");
    node.index_name = Some("users_pkey".to_string());
    node
}

/// Plan retriever returning canned plans.
///
/// The first rule whose marker occurs in the statement decides the outcome;
/// statements matching no rule get the default plan.
pub struct FakePlanRetriever {
    default_plan: ExecutionPlanNode,
    plans: Vec<(String, ExecutionPlanNode)>,
    failing: Vec<String>,
    actual_time_ms: Option<f64>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakePlanRetriever {
    pub fn new(default_plan: ExecutionPlanNode) -> Self {
        Self {
            default_plan,
            plans: Vec::new(),
            failing: Vec::new(),
            actual_time_ms: None,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_plan(mut self, marker: &str, plan: ExecutionPlanNode) -> Self {
        self.plans.push((marker.to_string(), plan));
        self
    }

    /// Statements containing `marker` fail plan retrieval
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.failing.push(marker.to_string());
        self
    }

    /// Report this engine-measured time on every returned plan
    pub fn with_actual_time(mut self, ms: f64) -> Self {
        self.actual_time_ms = Some(ms);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlanRetriever for FakePlanRetriever {
    async fn retrieve_plan(&self, sql: &str) -> Result<ExecutionPlanNode, PlanRetrievalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.iter().any(|m| sql.contains(m.as_str())) {
            return Err(PlanRetrievalError::Malformed("relation does not exist".to_string()));
        }

        let mut plan = self
            .plans
            .iter()
            .find(|(m, _)| sql.contains(m.as_str()))
            .map(|(_, p)| p.clone())
            .unwrap_or_else(|| self.default_plan.clone());
        if self.actual_time_ms.is_some() {
            plan.actual_total_time_ms = self.actual_time_ms;
        }
        Ok(plan)
    }
}

/// Executor returning one row per call; statements containing "broken" fail
#[derive(Default)]
pub struct FakeExecutor {
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl FakeExecutor {
    pub fn with_delay(delay: Duration) -> Self {
        Self { calls: AtomicUsize::new(0), delay: Some(delay) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryExecutor for FakeExecutor {
    async fn execute(
        &self,
        sql: &str,
        params: &[serde_json::Value],
    ) -> Result<serde_json::Value, sqlx::Error> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if sql.contains("broken") {
            return Err(sqlx::Error::RowNotFound);
        }
        Ok(serde_json::json!([{ "call": call, "params": params }]))
    }
}

/// Statistics source with fixed values; named statistics can be made to fail
#[derive(Default)]
pub struct FakeStatistics {
    failing: HashSet<&'static str>,
}

impl FakeStatistics {
    pub fn failing(statistics: &[&'static str]) -> Self {
        Self { failing: statistics.iter().copied().collect() }
    }

    fn check(&self, statistic: &'static str) -> StatisticsResult<()> {
        if self.failing.contains(statistic) {
            return Err(StatisticsError::unavailable(statistic, "permission denied"));
        }
        Ok(())
    }
}

#[async_trait]
impl StatisticsSource for FakeStatistics {
    async fn active_connections(&self) -> StatisticsResult<i64> {
        self.check("active_connections")?;
        Ok(3)
    }

    async fn cache_hit_ratio(&self) -> StatisticsResult<f64> {
        self.check("cache_hit_ratio")?;
        Ok(0.98)
    }

    async fn top_indexes(&self, limit: i64) -> StatisticsResult<Vec<IndexUsage>> {
        self.check("top_indexes")?;
        let indexes = (0..3)
            .map(|i| IndexUsage {
                schema_name: "public".to_string(),
                table_name: "users".to_string(),
                index_name: format!("users_idx_{}", i),
                reads: 100 - i,
                tuples_read: 1000 - i,
            })
            .take(limit.max(0) as usize)
            .collect();
        Ok(indexes)
    }

    async fn table_activity(&self, limit: i64) -> StatisticsResult<Vec<TableActivity>> {
        self.check("table_activity")?;
        let tables = [("orders", 900, 300), ("users", 500, 20), ("audit", 10, 400)]
            .into_iter()
            .map(|(name, reads, writes)| TableActivity {
                schema_name: "public".to_string(),
                table_name: name.to_string(),
                reads,
                writes,
                total_activity: reads + writes,
                size_bytes: 8192,
            })
            .take(limit.max(0) as usize)
            .collect();
        Ok(tables)
    }

    async fn connection_pool(&self) -> StatisticsResult<ConnectionPoolSnapshot> {
        self.check("connection_pool")?;
        Ok(ConnectionPoolSnapshot {
            total_connections: 12,
            active_connections: 3,
            idle_connections: 9,
            waiting_requests: 1,
        })
    }
}

pub fn create_test_analyzer(retriever: FakePlanRetriever) -> Arc<QueryAnalyzer> {
    create_test_analyzer_with(retriever, AnalyzerConfig::default())
}

pub fn create_test_analyzer_with(
    retriever: FakePlanRetriever,
    config: AnalyzerConfig,
) -> Arc<QueryAnalyzer> {
    Arc::new(QueryAnalyzer::new(Arc::new(retriever), &config))
}

/// Fully wired components over fakes
pub struct TestApp {
    pub analyzer: Arc<QueryAnalyzer>,
    pub cache: Arc<QueryCache>,
    pub executor: Arc<FakeExecutor>,
    pub monitor: Arc<PerformanceMonitor>,
    pub dashboard: Arc<DashboardService>,
}

impl TestApp {
    pub fn new(retriever: FakePlanRetriever, statistics: FakeStatistics) -> Self {
        let analyzer = create_test_analyzer(retriever);
        let executor = Arc::new(FakeExecutor::default());
        let statistics: Arc<dyn StatisticsSource> = Arc::new(statistics);

        let cache = Arc::new(
            QueryCache::new(executor.clone(), 100, Duration::from_secs(300))
                .with_analyzer(Arc::clone(&analyzer)),
        );
        let monitor = Arc::new(
            PerformanceMonitor::new(Arc::clone(&analyzer), Arc::clone(&statistics), 5)
                .with_cache(Arc::clone(&cache)),
        );
        let dashboard = Arc::new(
            DashboardService::new(Arc::clone(&analyzer), Arc::clone(&cache), statistics)
                .with_monitor(Arc::clone(&monitor)),
        );

        Self { analyzer, cache, executor, monitor, dashboard }
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::new(AppState {
            analyzer: Arc::clone(&self.analyzer),
            query_cache: Arc::clone(&self.cache),
            dashboard_service: Arc::clone(&self.dashboard),
        })
    }
}
