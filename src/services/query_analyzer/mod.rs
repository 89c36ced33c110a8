//! Query Analyzer
//!
//! Turns a read-only statement and its execution plan into optimization suggestions,
//! index recommendations and a performance score, and keeps a bounded rolling
//! history of per-shape execution metrics.
//!
//! ## Flow
//! 1. Refuse anything but a single read-only SELECT
//! 2. Retrieve the plan (wall-clock timed, or the engine's own time under ANALYZE)
//! 3. Evaluate suggestion rules, index recommendations and the score
//! 4. Fold the observation into the history entry of the statement's shape

mod error;
pub mod fingerprint;
pub mod history;
pub mod rules;
pub mod scoring;
pub mod statement;

pub use error::{AnalyzerError, AnalyzerResult};

use crate::config::AnalyzerConfig;
use crate::models::{QueryAnalysisDetail, QueryAnalysisResult, QueryPerformanceMetrics};
use crate::services::plan_retriever::PlanRetriever;
use chrono::Utc;
use history::QueryHistory;
use rules::{RuleContext, SuggestionRule};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

pub struct QueryAnalyzer {
    retriever: Arc<dyn PlanRetriever>,
    rules: Vec<Box<dyn SuggestionRule>>,
    history: Mutex<QueryHistory>,
    slow_query_threshold_ms: f64,
    join_cost_threshold: f64,
    use_actual_time: bool,
}

impl QueryAnalyzer {
    pub fn new(retriever: Arc<dyn PlanRetriever>, config: &AnalyzerConfig) -> Self {
        Self {
            retriever,
            rules: rules::default_rules(),
            history: Mutex::new(QueryHistory::new(config.max_history_size)),
            slow_query_threshold_ms: config.slow_query_threshold_ms as f64,
            join_cost_threshold: config.join_cost_threshold,
            use_actual_time: config.include_analyze,
        }
    }

    // A panic while holding the lock leaves the map consistent: every mutation
    // completes before any call that could panic.
    fn history(&self) -> MutexGuard<'_, QueryHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn slow_query_threshold_ms(&self) -> f64 {
        self.slow_query_threshold_ms
    }

    /// Analyze a single read-only statement and fold it into the history
    pub async fn analyze_query(&self, query: &str) -> AnalyzerResult<QueryAnalysisResult> {
        let (result, normalized) = self.run_analysis(query).await?;

        let metrics = self.history().record(
            &result.query_id,
            &normalized,
            query,
            result.execution_time_ms,
            result.analyzed_at,
            Some(result.clone()),
        );

        tracing::debug!(
            "Analyzed query {} in {:.2}ms: score={}, suggestions={}, executions={}",
            result.query_id,
            result.execution_time_ms,
            result.performance_score,
            result.suggestions.len(),
            metrics.total_executions
        );

        Ok(result)
    }

    /// Analyze again without counting an execution; only the stored latest
    /// analysis of the shape is refreshed.
    pub async fn reanalyze_query(&self, query: &str) -> AnalyzerResult<QueryAnalysisResult> {
        let (result, _) = self.run_analysis(query).await?;
        self.history().set_latest_analysis(&result.query_id, result.clone());
        Ok(result)
    }

    async fn run_analysis(&self, query: &str) -> AnalyzerResult<(QueryAnalysisResult, String)> {
        statement::ensure_read_only(query)?;

        let (query_id, normalized) = fingerprint::fingerprint(query);

        let start = Instant::now();
        let plan = self.retriever.retrieve_plan(query).await.map_err(|e| {
            tracing::warn!("Plan retrieval failed for query {}: {}", query_id, e);
            e
        })?;
        let wall_clock_ms = start.elapsed().as_secs_f64() * 1000.0;

        let execution_time_ms = if self.use_actual_time {
            plan.actual_total_time_ms.unwrap_or(wall_clock_ms)
        } else {
            wall_clock_ms
        };

        let context = RuleContext {
            sql: query,
            plan: &plan,
            join_cost_threshold: self.join_cost_threshold,
        };
        let suggestions = rules::evaluate_rules(&self.rules, &context);
        let index_recommendations = rules::recommend_indexes(query, &plan);
        let performance_score = scoring::performance_score(
            execution_time_ms,
            &plan,
            self.slow_query_threshold_ms,
        );

        let result = QueryAnalysisResult {
            query_id,
            query: query.to_string(),
            execution_time_ms,
            execution_plan: plan,
            suggestions,
            performance_score,
            index_recommendations,
            analyzed_at: Utc::now(),
        };

        Ok((result, normalized))
    }

    /// Record an execution observed outside `analyze_query` (no plan is retrieved)
    pub fn record_execution(&self, query: &str, execution_time_ms: f64) -> QueryPerformanceMetrics {
        let (query_id, normalized) = fingerprint::fingerprint(query);
        self.history()
            .record(&query_id, &normalized, query, execution_time_ms, Utc::now(), None)
    }

    /// Most recent raw text seen for a shape
    pub fn sample_query(&self, query_id: &str) -> Option<String> {
        self.history().get(query_id).map(|e| e.sample_query.clone())
    }

    /// Metrics of every tracked statement shape
    pub fn get_query_history(&self) -> Vec<QueryPerformanceMetrics> {
        self.history().metrics()
    }

    /// Shapes whose average execution time is strictly above `threshold_ms`
    pub fn get_slow_queries(&self, threshold_ms: f64) -> Vec<QueryPerformanceMetrics> {
        self.history()
            .metrics()
            .into_iter()
            .filter(|m| m.avg_execution_time_ms > threshold_ms)
            .collect()
    }

    pub fn get_query_metrics(&self, query_id: &str) -> Option<QueryPerformanceMetrics> {
        self.history().get(query_id).map(|e| e.metrics.clone())
    }

    pub fn latest_analysis(&self, query_id: &str) -> Option<QueryAnalysisResult> {
        self.history().get(query_id).and_then(|e| e.latest_analysis.clone())
    }

    /// Metrics and latest analysis of one shape, taken under a single lock
    pub fn get_query_detail(&self, query_id: &str) -> Option<QueryAnalysisDetail> {
        self.history().get(query_id).map(|e| QueryAnalysisDetail {
            metrics: e.metrics.clone(),
            latest_analysis: e.latest_analysis.clone(),
        })
    }

    pub fn clear_query_history(&self) {
        self.history().clear();
        tracing::info!("Query history cleared");
    }

    pub fn history_len(&self) -> usize {
        self.history().len()
    }
}
