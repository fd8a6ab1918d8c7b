//! REST API implementation
//!
//! - types: request/response payloads and shared state
//! - extractors: JSON and query extractors that reject with [`ServerError`]
//! - handlers: endpoint handlers
//! - router: router creation and layers
//!
//! [`ServerError`]: crate::error::ServerError

mod extractors;
mod handlers;
mod router;
pub mod types;

pub use extractors::{JsonExtractor, QueryExtractor};
pub use router::create_router;
pub use types::{
    AppState, CreateRequest, CreateResponse, HealthResponse, SearchParams, SearchResponse,
    DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT,
};
