//! REST API type definitions

use condnum_core::ConditionId;
use condnum_service::ConditionService;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Page size used when the query omits `limit`
pub const DEFAULT_SEARCH_LIMIT: u32 = 100;

/// Largest accepted page size; larger requests are clamped
pub const MAX_SEARCH_LIMIT: u32 = 1000;

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<dyn ConditionService>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Body of `POST /v1/conditions`
#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    /// Attribute key; empty matches every key
    #[serde(default)]
    pub key: String,

    /// Operator name, case-insensitive (`gt`, `gte`, `eq`, `lte`, `lt`)
    pub op: String,

    /// Threshold
    pub val: f64,
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub id: ConditionId,
}

/// Query of `GET /v1/conditions/search`
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub key: String,

    pub val: f64,

    #[serde(default)]
    pub limit: Option<u32>,

    /// Last id of the previous page
    #[serde(default)]
    pub cursor: Option<String>,
}

impl SearchParams {
    /// Requested page size, defaulted and clamped
    pub fn page_limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .min(MAX_SEARCH_LIMIT)
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub ids: Vec<ConditionId>,
}
