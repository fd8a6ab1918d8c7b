//! Condition service layer
//!
//! The service delegates every operation to a [`ConditionStorage`] and is the
//! seam where decorators attach. Decorators implement the same
//! [`ConditionService`] trait and wrap the next stage by composition:
//!
//! ```text
//! LoggingService -> CachedService -> StorageService -> ConditionStorage
//! ```
//!
//! Use [`ServiceBuilder`] to assemble the stack.

pub mod builder;
pub mod cache;
pub mod logging;
pub mod service;
pub mod stream;

pub use builder::ServiceBuilder;
pub use cache::{CacheBackend, CacheConfig, CacheError, CacheStats, CachedService, MemoryCache};
#[cfg(feature = "redis")]
pub use cache::RedisCache;
pub use condnum_storage::ConditionStorage;
pub use logging::LoggingService;
pub use service::{ConditionService, StorageService};
pub use stream::search_all;
