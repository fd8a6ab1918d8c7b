//! The condition service contract and its storage-backed implementation

use async_trait::async_trait;
use condnum_core::{ConditionError, ConditionId, ConditionResult, Op};
use condnum_storage::ConditionStorage;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Operations exposed to callers
///
/// Same shape as the storage contract, without lifecycle management. Every
/// decorator in this crate implements this trait and holds the next stage as an
/// `Arc<dyn ConditionService>`.
#[async_trait]
pub trait ConditionService: Send + Sync {
    /// Create a condition or reuse an unlocked duplicate
    async fn create(&self, key: &str, op: Op, value: f64) -> ConditionResult<ConditionId>;

    /// Acquire one create-lock reference
    async fn lock_create(&self, id: ConditionId) -> ConditionResult<()>;

    /// Release one create-lock reference
    async fn unlock_create(&self, id: ConditionId) -> ConditionResult<()>;

    /// Remove a condition
    async fn delete(&self, id: ConditionId) -> ConditionResult<()>;

    /// One page of ids matching `(key, value)`, strictly after `cursor`
    async fn search_page(
        &self,
        key: &str,
        value: f64,
        limit: u32,
        cursor: Option<ConditionId>,
    ) -> ConditionResult<Vec<ConditionId>>;
}

/// Service backed directly by a storage handle
///
/// Adds no business rules; storage errors pass through unchanged. With a
/// deadline configured, a storage call that does not finish in time is
/// abandoned and reported as `Internal`.
pub struct StorageService {
    storage: Arc<dyn ConditionStorage>,
    deadline: Option<Duration>,
}

impl StorageService {
    pub fn new(storage: Arc<dyn ConditionStorage>) -> Self {
        Self {
            storage,
            deadline: None,
        }
    }

    /// Bound every storage call by `deadline`
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    async fn bounded<T, F>(&self, operation: &str, call: F) -> ConditionResult<T>
    where
        F: Future<Output = ConditionResult<T>> + Send,
    {
        match self.deadline {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                ConditionError::internal(format!("{} timed out after {:?}", operation, limit))
            })?,
            None => call.await,
        }
    }
}

#[async_trait]
impl ConditionService for StorageService {
    async fn create(&self, key: &str, op: Op, value: f64) -> ConditionResult<ConditionId> {
        self.bounded("create", self.storage.create(key, op, value))
            .await
    }

    async fn lock_create(&self, id: ConditionId) -> ConditionResult<()> {
        self.bounded("lock_create", self.storage.lock_create(id))
            .await
    }

    async fn unlock_create(&self, id: ConditionId) -> ConditionResult<()> {
        self.bounded("unlock_create", self.storage.unlock_create(id))
            .await
    }

    async fn delete(&self, id: ConditionId) -> ConditionResult<()> {
        self.bounded("delete", self.storage.delete(id)).await
    }

    async fn search_page(
        &self,
        key: &str,
        value: f64,
        limit: u32,
        cursor: Option<ConditionId>,
    ) -> ConditionResult<Vec<ConditionId>> {
        self.bounded(
            "search_page",
            self.storage.search_page(key, value, limit, cursor),
        )
        .await
    }
}
