//! Assembly of the decorator stack

use crate::cache::{CacheBackend, CacheConfig, CachedService};
use crate::logging::LoggingService;
use crate::service::{ConditionService, StorageService};
use condnum_storage::ConditionStorage;
use std::sync::Arc;
use std::time::Duration;

/// Builder for a [`ConditionService`] stack
///
/// # Example
///
/// ```no_run
/// use condnum_service::{CacheConfig, MemoryCache, ServiceBuilder};
/// use condnum_storage::MemoryStorage;
/// use std::sync::Arc;
///
/// let config = CacheConfig { enabled: true, ..Default::default() };
/// let service = ServiceBuilder::new(Arc::new(MemoryStorage::default()))
///     .with_cache(Arc::new(MemoryCache::new(config.local_size)), &config)
///     .with_logging()
///     .build();
/// ```
pub struct ServiceBuilder {
    storage: Arc<dyn ConditionStorage>,
    deadline: Option<Duration>,
    cache: Option<(Arc<dyn CacheBackend>, CacheConfig)>,
    logging: bool,
}

impl ServiceBuilder {
    pub fn new(storage: Arc<dyn ConditionStorage>) -> Self {
        Self {
            storage,
            deadline: None,
            cache: None,
            logging: false,
        }
    }

    /// Bound each storage call by `deadline`
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Cache search results in `backend`
    ///
    /// Ignored when `config.enabled` is false.
    pub fn with_cache(mut self, backend: Arc<dyn CacheBackend>, config: &CacheConfig) -> Self {
        if config.enabled {
            self.cache = Some((backend, config.clone()));
        }
        self
    }

    /// Trace every call and its outcome
    pub fn with_logging(mut self) -> Self {
        self.logging = true;
        self
    }

    /// Build the stack: logging, then cache, then storage
    pub fn build(self) -> Arc<dyn ConditionService> {
        let mut base = StorageService::new(self.storage);
        if let Some(deadline) = self.deadline {
            base = base.with_deadline(deadline);
        }

        let mut service: Arc<dyn ConditionService> = Arc::new(base);
        if let Some((backend, config)) = self.cache {
            service = Arc::new(CachedService::new(service, backend, &config));
        }
        if self.logging {
            service = Arc::new(LoggingService::new(service));
        }
        service
    }
}
