//! Cache backend contract

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by a cache backend
///
/// These never reach callers of the condition service; the cache decorator
/// logs them and falls back to storage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Backend cannot be reached
    #[error("cache unavailable: {0}")]
    Unavailable(String),

    /// Backend rejected or failed the operation
    #[error("cache backend error: {0}")]
    Backend(String),
}

/// Key/value store used by the cache decorator
///
/// Only atomic primitives are required: a plain read, a set-if-absent write
/// with expiry, and namespace deletion.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read a live (non-expired) entry
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` unless a live entry exists; returns whether it was stored
    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Delete every entry whose key starts with `prefix`; returns the count
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError>;
}
