//! Redis-compatible cache backend (Redis, KeyDB, Valkey)

use super::backend::{CacheBackend, CacheError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, IntoConnectionInfo, RedisError};
use std::time::Duration;

/// Keys fetched per `SCAN` round trip
const SCAN_BATCH: usize = 500;

/// Reconnect backoff: `factor * base^attempt` milliseconds, `RETRIES` attempts
const BACKOFF_BASE: u64 = 2;
const BACKOFF_FACTOR_MS: u64 = 100;
const RETRIES: usize = 2;

/// Shared cache on a Redis-compatible server
///
/// `set_if_absent` is a single `SET NX PX`, so concurrent writers of one key
/// cannot overwrite each other. Namespace deletion walks the keyspace with
/// `SCAN MATCH` and deletes each batch.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    /// Connect to `addr` (`host:port` or a `redis://` URL)
    pub async fn connect(addr: &str, password: Option<&str>) -> Result<Self, CacheError> {
        let url = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("redis://{}", addr)
        };
        let mut info = url.as_str().into_connection_info().map_err(map_error)?;
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            info.redis.password = Some(password.to_string());
        }

        let client = Client::open(info).map_err(map_error)?;
        let conn =
            ConnectionManager::new_with_backoff(client, BACKOFF_BASE, BACKOFF_FACTOR_MS, RETRIES)
                .await
                .map_err(map_error)?;
        tracing::info!("Connected to Redis cache at {}", addr);
        Ok(Self { conn })
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<Vec<u8>>>(&mut conn)
            .await
            .map_err(map_error)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.conn.clone();
        let reply = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<_, Option<String>>(&mut conn)
            .await
            .map_err(map_error)?;
        Ok(reply.is_some())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let pattern = format!("{}*", escape_pattern(prefix));
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(map_error)?;
            if !keys.is_empty() {
                let removed: usize = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(map_error)?;
                deleted += removed;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(deleted)
    }
}

/// Escape glob metacharacters so the prefix matches literally
fn escape_pattern(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn map_error(err: RedisError) -> CacheError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
        CacheError::Unavailable(err.to_string())
    } else {
        CacheError::Backend(err.to_string())
    }
}
