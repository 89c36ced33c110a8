//! Query analysis data models

use super::plan::ExecutionPlanNode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Category of an optimization suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestionKind {
    Index,
    QueryRewrite,
    SchemaChange,
    Configuration,
}

/// Suggestion priority, ordered from least to most urgent
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OptimizationSuggestion {
    pub kind: SuggestionKind,
    pub priority: Priority,
    pub description: String,
    pub impact: String,
    pub implementation_hint: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexType {
    Btree,
    Hash,
    Gin,
    Gist,
}

impl IndexType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IndexType::Btree => "btree",
            IndexType::Hash => "hash",
            IndexType::Gin => "gin",
            IndexType::Gist => "gist",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IndexRecommendation {
    pub table_name: String,
    pub columns: Vec<String>,
    pub index_type: IndexType,
    /// Heuristic estimate in percent (0-100), not a measured value
    pub estimated_improvement_percent: u8,
    pub reason: String,
    /// `CREATE INDEX` statement; absent when no column could be determined
    pub create_statement: Option<String>,
}

/// Result of a single `analyze_query` call. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueryAnalysisResult {
    pub query_id: String,
    pub query: String,
    pub execution_time_ms: f64,
    pub execution_plan: ExecutionPlanNode,
    pub suggestions: Vec<OptimizationSuggestion>,
    /// 0 (worst) to 100 (best)
    pub performance_score: u8,
    pub index_recommendations: Vec<IndexRecommendation>,
    pub analyzed_at: DateTime<Utc>,
}

impl QueryAnalysisResult {
    pub fn has_suggestion(&self, kind: SuggestionKind, priority: Priority) -> bool {
        self.suggestions
            .iter()
            .any(|s| s.kind == kind && s.priority == priority)
    }

    pub fn highest_priority(&self) -> Option<Priority> {
        self.suggestions.iter().map(|s| s.priority).max()
    }
}

/// Body of `POST /api/queries/analyze`
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AnalyzeQueryRequest {
    pub query: String,
}

/// Rolling per-statement-shape execution metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct QueryPerformanceMetrics {
    pub query_id: String,
    pub normalized_query: String,
    pub avg_execution_time_ms: f64,
    pub total_executions: u64,
    pub slowest_execution_ms: f64,
    pub fastest_execution_ms: f64,
    pub last_executed_at: DateTime<Utc>,
}

/// History metrics together with the most recent analysis of the same shape
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueryAnalysisDetail {
    pub metrics: QueryPerformanceMetrics,
    pub latest_analysis: Option<QueryAnalysisResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Critical);
    }

    #[test]
    fn test_enum_wire_format() {
        assert_eq!(serde_json::to_string(&SuggestionKind::QueryRewrite).unwrap(), "\"QUERY_REWRITE\"");
        assert_eq!(serde_json::to_string(&Priority::Critical).unwrap(), "\"CRITICAL\"");
        assert_eq!(serde_json::to_string(&IndexType::Btree).unwrap(), "\"BTREE\"");
        let kind: SuggestionKind = serde_json::from_str("\"SCHEMA_CHANGE\"").unwrap();
        assert_eq!(kind, SuggestionKind::SchemaChange);
    }
}
