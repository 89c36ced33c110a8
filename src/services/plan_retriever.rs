//! Plan Retriever
//!
//! Obtains the structured execution plan of a statement from the engine via
//! `EXPLAIN (FORMAT JSON)`, optionally with `ANALYZE, BUFFERS` detail.

use crate::models::ExecutionPlanNode;
use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlanRetrievalError {
    #[error("database failed to produce a plan: {0}")]
    Database(#[from] sqlx::Error),

    #[error("unexpected EXPLAIN output: {0}")]
    Malformed(String),
}

/// Source of execution plans
#[async_trait]
pub trait PlanRetriever: Send + Sync {
    async fn retrieve_plan(&self, sql: &str) -> Result<ExecutionPlanNode, PlanRetrievalError>;
}

/// Build the EXPLAIN statement for `sql`
pub fn explain_statement(sql: &str, include_analyze: bool) -> String {
    let options = if include_analyze { "ANALYZE, BUFFERS, FORMAT JSON" } else { "FORMAT JSON" };
    format!("EXPLAIN ({}) {}", options, sql.trim().trim_end_matches(';'))
}

pub struct PgPlanRetriever {
    pool: PgPool,
    include_analyze: bool,
}

impl PgPlanRetriever {
    pub fn new(pool: PgPool, include_analyze: bool) -> Self {
        Self { pool, include_analyze }
    }
}

#[async_trait]
impl PlanRetriever for PgPlanRetriever {
    async fn retrieve_plan(&self, sql: &str) -> Result<ExecutionPlanNode, PlanRetrievalError> {
        let explain = explain_statement(sql, self.include_analyze);

        // ANALYZE really executes the statement, so pin the transaction read-only
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY").execute(&mut *tx).await?;
        let output: serde_json::Value = sqlx::query_scalar(&explain).fetch_one(&mut *tx).await?;
        tx.rollback().await?;

        ExecutionPlanNode::from_explain_json(&output)
            .map_err(|e| PlanRetrievalError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explain_statement_options() {
        assert_eq!(
            explain_statement("SELECT 1;", false),
            "EXPLAIN (FORMAT JSON) SELECT 1"
        );
        assert_eq!(
            explain_statement("  SELECT * FROM users  ", true),
            "EXPLAIN (ANALYZE, BUFFERS, FORMAT JSON) SELECT * FROM users"
        );
    }
}
