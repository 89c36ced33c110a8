use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::services::query_analyzer::AnalyzerError;

/// Error categories exposed over HTTP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    ValidationError,
    UnsupportedStatement,
    PlanRetrievalFailed,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::UnsupportedStatement => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::PlanRetrievalFailed => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::UnsupportedStatement => "UNSUPPORTED_STATEMENT",
            ErrorCode::PlanRetrievalFailed => "PLAN_RETRIEVAL_FAILED",
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

/// JSON body returned for every failed request
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    pub fn unsupported_statement(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UnsupportedStatement, message)
    }

    pub fn plan_retrieval_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PlanRetrievalFailed, message)
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed ({}): {}", self.code.as_str(), self.message);
        } else {
            tracing::debug!("Request rejected ({}): {}", self.code.as_str(), self.message);
        }

        let body = Json(ErrorResponse { code: self.code.as_str().to_string(), message: self.message });
        (status, body).into_response()
    }
}

impl From<AnalyzerError> for ApiError {
    fn from(err: AnalyzerError) -> Self {
        match &err {
            AnalyzerError::UnsupportedStatement(_) => ApiError::unsupported_statement(err.to_string()),
            AnalyzerError::PlanRetrieval(_) => ApiError::plan_retrieval_failed(err.to_string()),
        }
    }
}
