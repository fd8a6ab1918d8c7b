//! Shared test doubles for service tests

#![allow(dead_code)]

use async_trait::async_trait;
use condnum_core::{ConditionId, ConditionResult, Op};
use condnum_service::{CacheBackend, CacheError};
use condnum_storage::{ConditionStorage, MemoryStorage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Memory storage that counts searches and can stall them
///
/// A search computes its result first, then waits for `pause` to be free, so a
/// test holding `pause` can make a search return data that was current before
/// later writes.
#[derive(Default)]
pub struct CountingStorage {
    pub inner: MemoryStorage,
    pub searches: AtomicUsize,
    pub delay: Duration,
    pub pause: Mutex<()>,
}

impl CountingStorage {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConditionStorage for CountingStorage {
    async fn create(&self, key: &str, op: Op, value: f64) -> ConditionResult<ConditionId> {
        self.inner.create(key, op, value).await
    }

    async fn lock_create(&self, id: ConditionId) -> ConditionResult<()> {
        self.inner.lock_create(id).await
    }

    async fn unlock_create(&self, id: ConditionId) -> ConditionResult<()> {
        self.inner.unlock_create(id).await
    }

    async fn delete(&self, id: ConditionId) -> ConditionResult<()> {
        self.inner.delete(id).await
    }

    async fn search_page(
        &self,
        key: &str,
        value: f64,
        limit: u32,
        cursor: Option<ConditionId>,
    ) -> ConditionResult<Vec<ConditionId>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let ids = self.inner.search_page(key, value, limit, cursor).await?;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let _released = self.pause.lock().await;
        Ok(ids)
    }

    async fn close(&self) -> ConditionResult<()> {
        self.inner.close().await
    }
}

/// Cache backend whose every call fails
#[derive(Default)]
pub struct FailingCache {
    pub calls: AtomicUsize,
}

impl FailingCache {
    fn fail(&self) -> CacheError {
        self.calls.fetch_add(1, Ordering::SeqCst);
        CacheError::Unavailable("connection refused".to_string())
    }
}

#[async_trait]
impl CacheBackend for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        Err(self.fail())
    }

    async fn set_if_absent(
        &self,
        _key: &str,
        _value: Vec<u8>,
        _ttl: Duration,
    ) -> Result<bool, CacheError> {
        Err(self.fail())
    }

    async fn delete_prefix(&self, _prefix: &str) -> Result<usize, CacheError> {
        Err(self.fail())
    }
}
