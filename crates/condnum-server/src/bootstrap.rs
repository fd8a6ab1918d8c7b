//! Service assembly from configuration

use crate::config::ServerConfig;
use anyhow::Context;
use condnum_service::{
    CacheBackend, CacheConfig, ConditionService, MemoryCache, RedisCache, ServiceBuilder,
};
use condnum_storage::ConditionStorage;
use std::sync::Arc;
use tracing::info;

/// Storage handle and the service stack built on it
pub struct Application {
    pub storage: Arc<dyn ConditionStorage>,
    pub service: Arc<dyn ConditionService>,
}

/// Open storage and build the decorated service
pub async fn build_application(config: &ServerConfig) -> anyhow::Result<Application> {
    let storage = condnum_storage::connect(&config.db)
        .await
        .with_context(|| format!("Failed to open {} storage", config.db.backend))?;
    info!(
        backend = %config.db.backend,
        table = %config.db.table.name,
        "Storage opened"
    );

    let mut builder = ServiceBuilder::new(storage.clone());
    if let Some(timeout) = config.api.request_timeout() {
        builder = builder.with_deadline(timeout);
    }

    if config.cache.enabled {
        let backend = match open_cache(&config.cache).await {
            Ok(backend) => backend,
            Err(e) => {
                storage.close().await.ok();
                return Err(e);
            }
        };
        info!(
            ttl_secs = config.cache.ttl_secs,
            remote = config.cache.addr.is_some(),
            omitted = config.cache.omit_keys.len(),
            "Search cache enabled"
        );
        builder = builder.with_cache(backend, &config.cache);
    }

    Ok(Application {
        storage,
        service: builder.with_logging().build(),
    })
}

/// Redis-compatible server when `cache.addr` is set, otherwise an in-process map
async fn open_cache(config: &CacheConfig) -> anyhow::Result<Arc<dyn CacheBackend>> {
    match config.addr.as_deref().filter(|addr| !addr.is_empty()) {
        Some(addr) => {
            let cache = RedisCache::connect(addr, config.password.as_deref())
                .await
                .with_context(|| format!("Failed to connect to cache at {}", addr))?;
            Ok(Arc::new(cache))
        }
        None => Ok(Arc::new(MemoryCache::new(config.local_size))),
    }
}
