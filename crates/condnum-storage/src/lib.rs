//! Durable storage layer for numeric conditions
//!
//! This crate defines the [`ConditionStorage`] contract and its backends:
//!
//! - **Memory**: a document-style collection with a unique index, kept in process
//! - **PostgreSQL**: relational table with a unique constraint (feature `postgres`)
//! - **SQLite**: the same relational schema on SQLite (feature `sqlite`, the default backend)
//! - **MongoDB**: document collection with a unique index (feature `mongodb`)
//!
//! All backends share the matching rules from `condnum_core::matching` and
//! produce identical externally observable behavior.
//!
//! # Example
//!
//! ```no_run
//! use condnum_core::Op;
//! use condnum_storage::{ConditionStorage, MemoryStorage};
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = MemoryStorage::new(Duration::from_secs(60));
//! let id = storage.create("salary", Op::Gt, 1000.0).await?;
//! let ids = storage.search_page("salary", 1500.0, 10, None).await?;
//! assert_eq!(ids, vec![id]);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod memory;
#[cfg(feature = "mongodb")]
pub mod mongo;
#[cfg(any(feature = "postgres", feature = "sqlite"))]
pub mod sql;
pub mod traits;

pub use config::{StorageBackend, StorageConfig};
pub use memory::MemoryStorage;
#[cfg(feature = "mongodb")]
pub use mongo::MongoStorage;
#[cfg(feature = "postgres")]
pub use sql::postgres::PostgresStorage;
#[cfg(feature = "sqlite")]
pub use sql::sqlite::SqliteStorage;
pub use traits::ConditionStorage;

use condnum_core::{ConditionError, ConditionResult};
use std::sync::Arc;

/// Open the backend selected by `config`
pub async fn connect(config: &StorageConfig) -> ConditionResult<Arc<dyn ConditionStorage>> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory condition storage; data is lost on restart");
            Ok(Arc::new(MemoryStorage::new(config.create_lock_ttl())))
        }
        #[cfg(feature = "postgres")]
        StorageBackend::Postgres => Ok(Arc::new(PostgresStorage::connect(config).await?)),
        #[cfg(feature = "sqlite")]
        StorageBackend::Sqlite => Ok(Arc::new(SqliteStorage::connect(config).await?)),
        #[cfg(feature = "mongodb")]
        StorageBackend::Mongodb => Ok(Arc::new(MongoStorage::connect(config).await?)),
        #[allow(unreachable_patterns)]
        other => Err(ConditionError::internal(format!(
            "storage backend '{}' is not compiled in",
            other
        ))),
    }
}
