//! Read-through search cache
//!
//! [`CachedService`] memoizes `search_page` results in a [`CacheBackend`] and
//! clears the whole `conds:num` namespace after every successful create or
//! delete. Cache faults are logged and the call falls through to the wrapped
//! service.

mod backend;
mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use backend::{CacheBackend, CacheError};
pub use memory::MemoryCache;
#[cfg(feature = "redis")]
pub use self::redis::RedisCache;

use crate::service::ConditionService;
use async_trait::async_trait;
use condnum_core::{ConditionId, ConditionResult, Op};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};

/// Namespace shared by every search cache entry
pub const KEY_PREFIX: &str = "conds:num";

/// 2^63, the first float above the `i64` range
const I64_UPPER_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Wrap the service with the cache decorator
    #[serde(default)]
    pub enabled: bool,

    /// Entry lifetime in seconds
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Maximum entries held by the in-process backend
    #[serde(default = "default_local_size")]
    pub local_size: usize,

    /// Redis-compatible server (`host:port` or `redis://` URL); unset keeps the cache in process
    #[serde(default)]
    pub addr: Option<String>,

    /// Remote cache password
    #[serde(default)]
    pub password: Option<String>,

    /// Attribute keys never cached
    #[serde(default)]
    pub omit_keys: Vec<String>,
}

fn default_ttl_secs() -> u64 {
    60
}

fn default_local_size() -> usize {
    1_000_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl_secs: default_ttl_secs(),
            local_size: default_local_size(),
            addr: None,
            password: None,
            omit_keys: Vec::new(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Searches answered from the cache
    pub hits: u64,
    /// Searches computed by the wrapped service
    pub misses: u64,
    /// Searches not eligible for caching
    pub bypasses: u64,
    /// Backend faults absorbed by the decorator
    pub errors: u64,
}

impl CacheStats {
    /// Fraction of eligible searches served from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    bypasses: AtomicU64,
    errors: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Integer form of a probe value, if it is exactly representable as `i64`
pub fn cacheable_value(value: f64) -> Option<i64> {
    if value.fract() == 0.0 && value >= i64::MIN as f64 && value < I64_UPPER_BOUND {
        Some(value as i64)
    } else {
        None
    }
}

/// Cache key for one search page
pub fn cache_key(key: &str, value: i64, limit: u32, cursor: Option<ConditionId>) -> String {
    let cursor = cursor.map(|c| c.to_string()).unwrap_or_default();
    format!("{}:{}:{}:{}:{}", KEY_PREFIX, limit, cursor, value, key)
}

fn encode_ids(ids: &[ConditionId]) -> Vec<u8> {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
        .into_bytes()
}

fn decode_ids(raw: &[u8]) -> Option<Vec<ConditionId>> {
    let text = std::str::from_utf8(raw).ok()?;
    if text.is_empty() {
        return Some(Vec::new());
    }
    text.split(',').map(|part| part.parse().ok()).collect()
}

/// Caching decorator for [`ConditionService`]
pub struct CachedService {
    inner: Arc<dyn ConditionService>,
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    omit_keys: HashSet<String>,
    /// Bumped on every invalidation; held for reading while a result is stored
    generation: RwLock<u64>,
    /// One in-flight computation per cache key
    gates: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    counters: Counters,
}

impl CachedService {
    pub fn new(
        inner: Arc<dyn ConditionService>,
        backend: Arc<dyn CacheBackend>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            inner,
            backend,
            ttl: config.ttl(),
            omit_keys: config.omit_keys.iter().cloned().collect(),
            generation: RwLock::new(0),
            gates: StdMutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    fn eligible(&self, key: &str, value: f64) -> Option<i64> {
        if self.omit_keys.contains(key) {
            return None;
        }
        cacheable_value(value)
    }

    async fn lookup(&self, cache_key: &str) -> Option<Vec<ConditionId>> {
        match self.backend.get(cache_key).await {
            Ok(Some(raw)) => match decode_ids(&raw) {
                Some(ids) => Some(ids),
                None => {
                    Counters::bump(&self.counters.errors);
                    tracing::warn!(key = %cache_key, "Discarding undecodable cache entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                Counters::bump(&self.counters.errors);
                tracing::warn!(key = %cache_key, error = %e, "Cache read failed");
                None
            }
        }
    }

    async fn store(&self, cache_key: &str, ids: &[ConditionId], generation: u64) {
        let current = self.generation.read().await;
        if *current != generation {
            tracing::debug!(key = %cache_key, "Skipping cache write after invalidation");
            return;
        }
        if let Err(e) = self
            .backend
            .set_if_absent(cache_key, encode_ids(ids), self.ttl)
            .await
        {
            Counters::bump(&self.counters.errors);
            tracing::warn!(key = %cache_key, error = %e, "Cache write failed");
        }
    }

    async fn invalidate(&self) {
        let mut generation = self.generation.write().await;
        *generation = generation.wrapping_add(1);
        let prefix = format!("{}:", KEY_PREFIX);
        match self.backend.delete_prefix(&prefix).await {
            Ok(removed) => tracing::debug!(removed, "Invalidated search cache"),
            Err(e) => {
                Counters::bump(&self.counters.errors);
                tracing::warn!(error = %e, "Search cache invalidation failed");
            }
        }
    }

    fn gate(&self, cache_key: &str) -> GateGuard<'_> {
        let gate = match self.gates.lock() {
            Ok(mut gates) => gates.entry(cache_key.to_string()).or_default().clone(),
            Err(poisoned) => poisoned
                .into_inner()
                .entry(cache_key.to_string())
                .or_default()
                .clone(),
        };
        GateGuard {
            gates: &self.gates,
            key: cache_key.to_string(),
            gate,
        }
    }

    async fn search_cached(
        &self,
        cache_key: &str,
        key: &str,
        value: f64,
        limit: u32,
        cursor: Option<ConditionId>,
    ) -> ConditionResult<Vec<ConditionId>> {
        if let Some(ids) = self.lookup(cache_key).await {
            Counters::bump(&self.counters.hits);
            return Ok(ids);
        }

        let guard = self.gate(cache_key);
        let _computing = guard.gate.lock().await;

        // another task may have filled the entry while this one waited
        if let Some(ids) = self.lookup(cache_key).await {
            Counters::bump(&self.counters.hits);
            return Ok(ids);
        }

        Counters::bump(&self.counters.misses);
        let generation = *self.generation.read().await;
        let ids = self.inner.search_page(key, value, limit, cursor).await?;
        self.store(cache_key, &ids, generation).await;
        Ok(ids)
    }
}

/// Drops the per-key gate from the map once no other task holds it
struct GateGuard<'a> {
    gates: &'a StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    key: String,
    gate: Arc<Mutex<()>>,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut gates = match self.gates.lock() {
            Ok(gates) => gates,
            Err(poisoned) => poisoned.into_inner(),
        };
        // the map and this guard are the only owners
        if Arc::strong_count(&self.gate) == 2 {
            gates.remove(&self.key);
        }
    }
}

#[async_trait]
impl ConditionService for CachedService {
    async fn create(&self, key: &str, op: Op, value: f64) -> ConditionResult<ConditionId> {
        let id = self.inner.create(key, op, value).await?;
        self.invalidate().await;
        Ok(id)
    }

    async fn lock_create(&self, id: ConditionId) -> ConditionResult<()> {
        self.inner.lock_create(id).await
    }

    async fn unlock_create(&self, id: ConditionId) -> ConditionResult<()> {
        self.inner.unlock_create(id).await
    }

    async fn delete(&self, id: ConditionId) -> ConditionResult<()> {
        self.inner.delete(id).await?;
        self.invalidate().await;
        Ok(())
    }

    async fn search_page(
        &self,
        key: &str,
        value: f64,
        limit: u32,
        cursor: Option<ConditionId>,
    ) -> ConditionResult<Vec<ConditionId>> {
        match self.eligible(key, value) {
            Some(int_value) => {
                let cache_key = cache_key(key, int_value, limit, cursor);
                self.search_cached(&cache_key, key, value, limit, cursor)
                    .await
            }
            None => {
                Counters::bump(&self.counters.bypasses);
                self.inner.search_page(key, value, limit, cursor).await
            }
        }
    }
}
