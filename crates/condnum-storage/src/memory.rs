//! In-process document store
//!
//! Conditions are kept as documents in an ordered collection keyed by id, with
//! a unique index over `(key, op, value)`. Every mutation runs under the
//! collection's write lock, which gives `create` the same atomic
//! find-or-insert semantics a document database provides with an upsert on a
//! unique index.

use crate::traits::ConditionStorage;
use async_trait::async_trait;
use chrono::Utc;
use condnum_core::{
    check_threshold, Condition, ConditionError, ConditionId, ConditionResult, CreateLock, Op, Probe,
};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Unique index entry: `(key, op, canonical value bits)`
type UniqueKey = (String, Op, u64);

#[derive(Debug, Clone)]
struct Document {
    condition: Condition,
    lock: CreateLock,
}

#[derive(Debug, Default)]
struct Collection {
    last_seq: u64,
    docs: BTreeMap<ConditionId, Document>,
    unique: HashMap<UniqueKey, ConditionId>,
}

/// Document-style in-memory condition store
///
/// Suitable for tests, single-node deployments and development. Data is lost
/// when the process exits.
pub struct MemoryStorage {
    collection: RwLock<Collection>,
    create_lock_ttl: chrono::Duration,
    closed: AtomicBool,
}

impl MemoryStorage {
    /// Create an empty store whose create-locks expire after `create_lock_ttl`
    pub fn new(create_lock_ttl: Duration) -> Self {
        Self {
            collection: RwLock::new(Collection::default()),
            create_lock_ttl: to_chrono(create_lock_ttl),
            closed: AtomicBool::new(false),
        }
    }

    /// Number of stored conditions
    pub async fn len(&self) -> usize {
        self.collection.read().await.docs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Look up a stored condition by id
    pub async fn get(&self, id: ConditionId) -> Option<Condition> {
        self.collection
            .read()
            .await
            .docs
            .get(&id)
            .map(|doc| doc.condition.clone())
    }

    fn ensure_open(&self) -> ConditionResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ConditionError::internal("storage is closed"));
        }
        Ok(())
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(Duration::from_secs(1000))
    }
}

#[async_trait]
impl ConditionStorage for MemoryStorage {
    async fn create(&self, key: &str, op: Op, value: f64) -> ConditionResult<ConditionId> {
        self.ensure_open()?;
        check_threshold(value)?;
        let unique_key = (key.to_string(), op, canonical_bits(value));
        let mut coll = self.collection.write().await;

        if let Some(&id) = coll.unique.get(&unique_key) {
            let doc = coll.docs.get(&id).ok_or_else(|| {
                ConditionError::internal(format!("unique index points to missing id={}", id))
            })?;
            if doc.lock.is_active(Utc::now(), self.create_lock_ttl) {
                return Err(ConditionError::conflict(format!(
                    "key={}, op={}, val={}: create is locked by id={}",
                    key, op, value, id
                )));
            }
            return Ok(id);
        }

        coll.last_seq += 1;
        let id = ConditionId::new(coll.last_seq);
        coll.docs.insert(
            id,
            Document {
                condition: Condition::new(id, key, op, value),
                lock: CreateLock::default(),
            },
        );
        coll.unique.insert(unique_key, id);
        Ok(id)
    }

    async fn lock_create(&self, id: ConditionId) -> ConditionResult<()> {
        self.ensure_open()?;
        let mut coll = self.collection.write().await;
        let doc = coll
            .docs
            .get_mut(&id)
            .ok_or_else(|| ConditionError::not_found(format!("id={}", id)))?;
        doc.lock.acquire(Utc::now());
        Ok(())
    }

    async fn unlock_create(&self, id: ConditionId) -> ConditionResult<()> {
        self.ensure_open()?;
        let mut coll = self.collection.write().await;
        if let Some(doc) = coll.docs.get_mut(&id) {
            doc.lock.release();
        }
        Ok(())
    }

    async fn delete(&self, id: ConditionId) -> ConditionResult<()> {
        self.ensure_open()?;
        let mut coll = self.collection.write().await;
        if let Some(doc) = coll.docs.remove(&id) {
            let c = doc.condition;
            coll.unique.remove(&(c.key, c.op, canonical_bits(c.value)));
        }
        Ok(())
    }

    async fn search_page(
        &self,
        key: &str,
        value: f64,
        limit: u32,
        cursor: Option<ConditionId>,
    ) -> ConditionResult<Vec<ConditionId>> {
        self.ensure_open()?;
        let probe = Probe::new(key, value);
        if !probe.is_satisfiable() {
            return Ok(Vec::new());
        }
        let lower = match cursor {
            Some(c) => Bound::Excluded(c),
            None => Bound::Unbounded,
        };

        let coll = self.collection.read().await;
        let ids = coll
            .docs
            .range((lower, Bound::Unbounded))
            .filter(|(_, doc)| probe.matches(&doc.condition))
            .map(|(id, _)| *id)
            .take(limit as usize)
            .collect();
        Ok(ids)
    }

    async fn close(&self) -> ConditionResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Bits used by the unique index; `-0.0` and `0.0` collapse
fn canonical_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else {
        value.to_bits()
    }
}

pub(crate) fn to_chrono(ttl: Duration) -> chrono::Duration {
    chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_assigns_ascending_ids() {
        let storage = MemoryStorage::default();
        let a = storage.create("a", Op::Gt, 1.0).await.unwrap();
        let b = storage.create("b", Op::Gt, 1.0).await.unwrap();
        assert!(a < b);
        assert_eq!(storage.len().await, 2);
    }

    #[tokio::test]
    async fn test_create_reuses_unlocked_duplicate() {
        let storage = MemoryStorage::default();
        let a = storage.create("k", Op::Eq, 3.0).await.unwrap();
        let b = storage.create("k", Op::Eq, 3.0).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn test_negative_zero_is_same_condition() {
        let storage = MemoryStorage::default();
        let a = storage.create("k", Op::Eq, 0.0).await.unwrap();
        let b = storage.create("k", Op::Eq, -0.0).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_delete_frees_unique_slot() {
        let storage = MemoryStorage::default();
        let a = storage.create("k", Op::Lt, 7.0).await.unwrap();
        storage.delete(a).await.unwrap();
        assert!(storage.get(a).await.is_none());

        let b = storage.create("k", Op::Lt, 7.0).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_closed_storage_fails_internal() {
        let storage = MemoryStorage::default();
        storage.close().await.unwrap();
        let err = storage.create("k", Op::Lt, 7.0).await.unwrap_err();
        assert!(err.is_internal());
    }
}
