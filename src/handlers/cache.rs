use axum::{Json, extract::State};
use std::sync::Arc;

use crate::models::{InvalidateCacheRequest, InvalidateCacheResponse};
use crate::utils::{ApiError, ApiResult};

#[utoipa::path(
    post,
    path = "/api/cache/invalidate",
    request_body = InvalidateCacheRequest,
    responses(
        (status = 200, description = "Number of removed cache entries", body = InvalidateCacheResponse),
        (status = 400, description = "Empty pattern")
    ),
    tag = "Cache"
)]
pub async fn invalidate_cache(
    State(state): State<Arc<crate::AppState>>,
    Json(request): Json<InvalidateCacheRequest>,
) -> ApiResult<Json<InvalidateCacheResponse>> {
    if request.pattern.trim().is_empty() {
        return Err(ApiError::validation_error("pattern must not be empty"));
    }

    let removed = state.query_cache.invalidate_by_pattern(&request.pattern);

    Ok(Json(InvalidateCacheResponse { pattern: request.pattern, removed }))
}
