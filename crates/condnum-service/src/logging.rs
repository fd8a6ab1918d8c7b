//! Tracing decorator

use crate::service::ConditionService;
use async_trait::async_trait;
use condnum_core::{ConditionId, ConditionResult, Op};
use std::sync::Arc;

/// Emits one tracing event per call: `debug` on success, `error` on failure
pub struct LoggingService {
    inner: Arc<dyn ConditionService>,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn ConditionService>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ConditionService for LoggingService {
    async fn create(&self, key: &str, op: Op, value: f64) -> ConditionResult<ConditionId> {
        let result = self.inner.create(key, op, value).await;
        match &result {
            Ok(id) => tracing::debug!(key, %op, value, %id, "create"),
            Err(e) => tracing::error!(key, %op, value, error = %e, "create failed"),
        }
        result
    }

    async fn lock_create(&self, id: ConditionId) -> ConditionResult<()> {
        let result = self.inner.lock_create(id).await;
        match &result {
            Ok(()) => tracing::debug!(%id, "lock_create"),
            Err(e) => tracing::error!(%id, error = %e, "lock_create failed"),
        }
        result
    }

    async fn unlock_create(&self, id: ConditionId) -> ConditionResult<()> {
        let result = self.inner.unlock_create(id).await;
        match &result {
            Ok(()) => tracing::debug!(%id, "unlock_create"),
            Err(e) => tracing::error!(%id, error = %e, "unlock_create failed"),
        }
        result
    }

    async fn delete(&self, id: ConditionId) -> ConditionResult<()> {
        let result = self.inner.delete(id).await;
        match &result {
            Ok(()) => tracing::debug!(%id, "delete"),
            Err(e) => tracing::error!(%id, error = %e, "delete failed"),
        }
        result
    }

    async fn search_page(
        &self,
        key: &str,
        value: f64,
        limit: u32,
        cursor: Option<ConditionId>,
    ) -> ConditionResult<Vec<ConditionId>> {
        let result = self.inner.search_page(key, value, limit, cursor).await;
        let cursor = cursor.map(|c| c.to_string()).unwrap_or_default();
        match &result {
            Ok(ids) => tracing::debug!(key, value, limit, %cursor, count = ids.len(), "search_page"),
            Err(e) => tracing::error!(key, value, limit, %cursor, error = %e, "search_page failed"),
        }
        result
    }
}
