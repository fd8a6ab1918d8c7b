//! API endpoint handlers

use super::extractors::{JsonExtractor, QueryExtractor};
use super::types::*;
use crate::error::ServerError;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use condnum_core::{ConditionId, Op};

/// Health check endpoint
pub(super) async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Create a condition, or reuse an unlocked duplicate
pub(super) async fn create_condition(
    State(state): State<AppState>,
    JsonExtractor(payload): JsonExtractor<CreateRequest>,
) -> Result<Json<CreateResponse>, ServerError> {
    let op: Op = payload.op.parse().map_err(ServerError::InvalidRequest)?;
    let id = state.service.create(&payload.key, op, payload.val).await?;
    Ok(Json(CreateResponse { id }))
}

/// Acquire a create-lock reference
///
/// An id that does not parse cannot exist, so it is reported as not found.
pub(super) async fn lock_condition(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    let id: ConditionId = id
        .parse()
        .map_err(|_| ServerError::NotFound(format!("condition {}", id)))?;
    state.service.lock_create(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Release a create-lock reference; unknown ids succeed
pub(super) async fn unlock_condition(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    if let Ok(id) = id.parse::<ConditionId>() {
        state.service.unlock_create(id).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Delete a condition; unknown ids succeed
pub(super) async fn delete_condition(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ServerError> {
    if let Ok(id) = id.parse::<ConditionId>() {
        state.service.delete(id).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// One page of condition ids matching `(key, val)`
pub(super) async fn search_conditions(
    State(state): State<AppState>,
    QueryExtractor(params): QueryExtractor<SearchParams>,
) -> Result<Json<SearchResponse>, ServerError> {
    if !params.val.is_finite() {
        return Err(ServerError::InvalidRequest(format!(
            "val must be a finite number, got {}",
            params.val
        )));
    }
    let cursor = parse_cursor(params.cursor.as_deref())?;
    let ids = state
        .service
        .search_page(&params.key, params.val, params.page_limit(), cursor)
        .await?;
    Ok(Json(SearchResponse { ids }))
}

fn parse_cursor(raw: Option<&str>) -> Result<Option<ConditionId>, ServerError> {
    match raw {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| ServerError::InvalidRequest(format!("invalid cursor: {}", e))),
    }
}
