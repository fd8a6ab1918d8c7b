//! Router creation and configuration

use super::handlers::*;
use super::types::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use condnum_service::ConditionService;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create REST API router
pub fn create_router(service: Arc<dyn ConditionService>) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/health", get(health))
        .route("/v1/conditions", post(create_condition))
        .route("/v1/conditions/search", get(search_conditions))
        .route("/v1/conditions/:id", delete(delete_condition))
        .route("/v1/conditions/:id/lock", post(lock_condition))
        .route("/v1/conditions/:id/unlock", post(unlock_condition))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
