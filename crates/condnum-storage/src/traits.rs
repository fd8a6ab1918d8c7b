//! The durable storage contract

use async_trait::async_trait;
use condnum_core::{ConditionId, ConditionResult, Op};

/// Durable store of numeric conditions
///
/// # Implementation Notes
///
/// - `create` is an atomic insert-if-absent keyed by `(key, op, value)`. An
///   existing record is returned unchanged unless its create-lock is active, in
///   which case the call fails with `Conflict`.
/// - `lock_create` fails with `NotFound` for unknown ids; `unlock_create` and
///   `delete` succeed for unknown ids.
/// - `search_page` returns ids in ascending order strictly after `cursor`;
///   a page shorter than `limit` means the result set is exhausted.
///
/// # Thread Safety
///
/// Implementations are shared across concurrent requests and must be
/// `Send + Sync`.
#[async_trait]
pub trait ConditionStorage: Send + Sync {
    /// Create a condition or return the id of an unlocked duplicate
    async fn create(&self, key: &str, op: Op, value: f64) -> ConditionResult<ConditionId>;

    /// Acquire one create-lock reference on `id`
    async fn lock_create(&self, id: ConditionId) -> ConditionResult<()>;

    /// Release one create-lock reference on `id`
    async fn unlock_create(&self, id: ConditionId) -> ConditionResult<()>;

    /// Remove a condition
    async fn delete(&self, id: ConditionId) -> ConditionResult<()>;

    /// Ids of the conditions matched by `(key, value)`
    async fn search_page(
        &self,
        key: &str,
        value: f64,
        limit: u32,
        cursor: Option<ConditionId>,
    ) -> ConditionResult<Vec<ConditionId>>;

    /// Release backend resources
    async fn close(&self) -> ConditionResult<()>;
}
