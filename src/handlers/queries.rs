use axum::{Json, extract::State};
use std::sync::Arc;

use crate::models::{AnalyzeQueryRequest, QueryAnalysisResult};
use crate::utils::{ApiError, ApiResult};

#[utoipa::path(
    post,
    path = "/api/queries/analyze",
    request_body = AnalyzeQueryRequest,
    responses(
        (status = 200, description = "Plan, suggestions, index recommendations and score", body = QueryAnalysisResult),
        (status = 400, description = "Empty query"),
        (status = 422, description = "Statement is not a single read-only SELECT"),
        (status = 502, description = "Database could not produce a plan")
    ),
    tag = "Queries"
)]
pub async fn analyze_query(
    State(state): State<Arc<crate::AppState>>,
    Json(request): Json<AnalyzeQueryRequest>,
) -> ApiResult<Json<QueryAnalysisResult>> {
    let query = request.query.trim();
    if query.is_empty() {
        return Err(ApiError::validation_error("query must not be empty"));
    }

    let result = state.analyzer.analyze_query(query).await?;
    Ok(Json(result))
}
