use crate::services::plan_retriever::PlanRetrievalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// Only single read-only SELECT statements are analyzed
    #[error("unsupported statement: {0}")]
    UnsupportedStatement(String),

    #[error("plan retrieval failed: {0}")]
    PlanRetrieval(#[from] PlanRetrievalError),
}

pub type AnalyzerResult<T> = Result<T, AnalyzerError>;
