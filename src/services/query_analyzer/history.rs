//! Bounded per-shape execution history
//!
//! Keyed by `query_id`. When the map grows past its capacity the entry that was
//! inserted first is dropped, regardless of how recently it was updated.

use crate::models::{QueryAnalysisResult, QueryPerformanceMetrics};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub metrics: QueryPerformanceMetrics,
    /// Most recent raw statement text of this shape, used for re-analysis
    pub sample_query: String,
    /// Most recent full analysis of this shape, if it was ever analyzed
    pub latest_analysis: Option<QueryAnalysisResult>,
}

#[derive(Debug)]
pub struct QueryHistory {
    entries: HashMap<String, HistoryEntry>,
    insertion_order: VecDeque<String>,
    max_size: usize,
}

impl QueryHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }

    /// Fold one observation into the metrics of `query_id`, creating the entry on first
    /// sight. Returns the updated metrics.
    pub fn record(
        &mut self,
        query_id: &str,
        normalized_query: &str,
        sample_query: &str,
        execution_time_ms: f64,
        executed_at: DateTime<Utc>,
        analysis: Option<QueryAnalysisResult>,
    ) -> QueryPerformanceMetrics {
        match self.entries.get_mut(query_id) {
            Some(entry) => {
                let m = &mut entry.metrics;
                m.total_executions += 1;
                m.avg_execution_time_ms +=
                    (execution_time_ms - m.avg_execution_time_ms) / m.total_executions as f64;
                m.slowest_execution_ms = m.slowest_execution_ms.max(execution_time_ms);
                m.fastest_execution_ms = m.fastest_execution_ms.min(execution_time_ms);
                if executed_at > m.last_executed_at {
                    m.last_executed_at = executed_at;
                }
                let metrics = m.clone();
                entry.sample_query = sample_query.to_string();
                if analysis.is_some() {
                    entry.latest_analysis = analysis;
                }
                metrics
            },
            None => {
                let metrics = QueryPerformanceMetrics {
                    query_id: query_id.to_string(),
                    normalized_query: normalized_query.to_string(),
                    avg_execution_time_ms: execution_time_ms,
                    total_executions: 1,
                    slowest_execution_ms: execution_time_ms,
                    fastest_execution_ms: execution_time_ms,
                    last_executed_at: executed_at,
                };
                self.entries.insert(
                    query_id.to_string(),
                    HistoryEntry {
                        metrics: metrics.clone(),
                        sample_query: sample_query.to_string(),
                        latest_analysis: analysis,
                    },
                );
                self.insertion_order.push_back(query_id.to_string());
                self.evict_overflow();
                metrics
            },
        }
    }

    fn evict_overflow(&mut self) {
        while self.entries.len() > self.max_size {
            let Some(oldest) = self.insertion_order.pop_front() else { break };
            if self.entries.remove(&oldest).is_some() {
                tracing::debug!("Evicted query {} from history", oldest);
            }
        }
    }

    /// Replace the latest analysis without counting an execution.
    /// Returns false when the shape is no longer tracked.
    pub fn set_latest_analysis(&mut self, query_id: &str, analysis: QueryAnalysisResult) -> bool {
        match self.entries.get_mut(query_id) {
            Some(entry) => {
                entry.latest_analysis = Some(analysis);
                true
            },
            None => false,
        }
    }

    pub fn get(&self, query_id: &str) -> Option<&HistoryEntry> {
        self.entries.get(query_id)
    }

    /// All metrics, in insertion order
    pub fn metrics(&self) -> Vec<QueryPerformanceMetrics> {
        self.insertion_order
            .iter()
            .filter_map(|id| self.entries.get(id))
            .map(|e| e.metrics.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
    }
}
