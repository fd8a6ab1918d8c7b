//! Cache decorator behavior over a counting storage

mod common;

use common::{CountingStorage, FailingCache};
use condnum_core::Op;
use condnum_service::{
    CacheConfig, CachedService, ConditionService, MemoryCache, ServiceBuilder, StorageService,
};
use std::sync::Arc;
use std::time::Duration;

fn enabled() -> CacheConfig {
    CacheConfig {
        enabled: true,
        ..Default::default()
    }
}

fn cached(storage: Arc<CountingStorage>, config: &CacheConfig) -> Arc<CachedService> {
    let backend = Arc::new(MemoryCache::new(config.local_size));
    Arc::new(CachedService::new(
        Arc::new(StorageService::new(storage)),
        backend,
        config,
    ))
}

#[tokio::test]
async fn test_repeated_search_is_served_from_cache() {
    let storage = Arc::new(CountingStorage::default());
    let service = cached(storage.clone(), &enabled());
    let id = service.create("salary", Op::Eq, 3.0).await.unwrap();

    let first = service.search_page("salary", 3.0, 10, None).await.unwrap();
    let second = service.search_page("salary", 3.0, 10, None).await.unwrap();

    assert_eq!(first, vec![id]);
    assert_eq!(second, vec![id]);
    assert_eq!(storage.searches(), 1);

    let stats = service.stats();
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hit_rate(), 0.5);
}

#[tokio::test]
async fn test_distinct_pages_use_distinct_entries() {
    let storage = Arc::new(CountingStorage::default());
    let service = cached(storage.clone(), &enabled());
    let a = service.create("x", Op::Gte, 0.0).await.unwrap();
    let b = service.create("x", Op::Gte, 1.0).await.unwrap();

    let first = service.search_page("x", 5.0, 1, None).await.unwrap();
    let second = service.search_page("x", 5.0, 1, Some(a)).await.unwrap();

    assert_eq!(first, vec![a]);
    assert_eq!(second, vec![b]);
    assert_eq!(storage.searches(), 2);
}

#[tokio::test]
async fn test_create_invalidates_cached_results() {
    let storage = Arc::new(CountingStorage::default());
    let service = cached(storage.clone(), &enabled());

    assert!(service.search_page("salary", 3.0, 10, None).await.unwrap().is_empty());
    let id = service.create("salary", Op::Gt, 2.0).await.unwrap();

    let ids = service.search_page("salary", 3.0, 10, None).await.unwrap();
    assert_eq!(ids, vec![id]);
    assert_eq!(storage.searches(), 2);
}

#[tokio::test]
async fn test_delete_invalidates_cached_results() {
    let storage = Arc::new(CountingStorage::default());
    let service = cached(storage.clone(), &enabled());
    let id = service.create("salary", Op::Lt, 10.0).await.unwrap();

    assert_eq!(service.search_page("salary", 3.0, 10, None).await.unwrap(), vec![id]);
    service.delete(id).await.unwrap();

    assert!(service.search_page("salary", 3.0, 10, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_create_keeps_cache() {
    let storage = Arc::new(CountingStorage::default());
    let service = cached(storage.clone(), &enabled());
    let id = service.create("k", Op::Eq, 1.0).await.unwrap();
    service.lock_create(id).await.unwrap();

    service.search_page("k", 1.0, 10, None).await.unwrap();
    let err = service.create("k", Op::Eq, 1.0).await.unwrap_err();
    assert!(err.is_conflict());

    service.search_page("k", 1.0, 10, None).await.unwrap();
    assert_eq!(storage.searches(), 1);
}

#[tokio::test]
async fn test_non_integral_values_bypass_cache() {
    let storage = Arc::new(CountingStorage::default());
    let service = cached(storage.clone(), &enabled());

    service.search_page("salary", 2.5, 10, None).await.unwrap();
    service.search_page("salary", 2.5, 10, None).await.unwrap();
    service.search_page("salary", 1e19, 10, None).await.unwrap();

    assert_eq!(storage.searches(), 3);
    assert_eq!(service.stats().bypasses, 3);
    assert_eq!(service.stats().misses, 0);
}

#[tokio::test]
async fn test_omitted_keys_bypass_cache() {
    let storage = Arc::new(CountingStorage::default());
    let config = CacheConfig {
        omit_keys: vec!["SourceId".to_string()],
        ..enabled()
    };
    let service = cached(storage.clone(), &config);

    service.search_page("SourceId", 7.0, 10, None).await.unwrap();
    service.search_page("SourceId", 7.0, 10, None).await.unwrap();
    service.search_page("other", 7.0, 10, None).await.unwrap();
    service.search_page("other", 7.0, 10, None).await.unwrap();

    assert_eq!(storage.searches(), 3);
    assert_eq!(service.stats().bypasses, 2);
}

#[tokio::test]
async fn test_cache_faults_fall_back_to_storage() {
    let storage = Arc::new(CountingStorage::default());
    let backend = Arc::new(FailingCache::default());
    let service = CachedService::new(
        Arc::new(StorageService::new(storage.clone())),
        backend.clone(),
        &enabled(),
    );

    let id = service.create("salary", Op::Gte, 1.0).await.unwrap();
    let ids = service.search_page("salary", 3.0, 10, None).await.unwrap();
    service.delete(id).await.unwrap();

    assert_eq!(ids, vec![id]);
    assert_eq!(storage.searches(), 1);
    assert!(service.stats().errors > 0);
    assert!(backend.calls.load(std::sync::atomic::Ordering::SeqCst) > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_compute_once() {
    let storage = Arc::new(CountingStorage::with_delay(Duration::from_millis(100)));
    let service = cached(storage.clone(), &enabled());
    let id = service.create("temperature", Op::Gt, 20.0).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            service.search_page("temperature", 25.0, 10, None).await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), vec![id]);
    }

    assert_eq!(storage.searches(), 1);
    assert_eq!(service.stats().misses, 1);
    assert_eq!(service.stats().hits, 15);
}

#[tokio::test]
async fn test_result_computed_before_invalidation_is_not_stored() {
    let storage = Arc::new(CountingStorage::default());
    let service = cached(storage.clone(), &enabled());

    let paused = storage.pause.lock().await;
    let search = {
        let service = service.clone();
        tokio::spawn(async move { service.search_page("salary", 3.0, 10, None).await })
    };
    while storage.searches() == 0 {
        tokio::task::yield_now().await;
    }

    let id = service.create("salary", Op::Lte, 3.0).await.unwrap();
    drop(paused);

    let stale = search.await.unwrap().unwrap();
    assert!(stale.is_empty());

    let fresh = service.search_page("salary", 3.0, 10, None).await.unwrap();
    assert_eq!(fresh, vec![id]);
    assert_eq!(storage.searches(), 2);
}

#[tokio::test]
async fn test_builder_skips_disabled_cache() {
    let storage = Arc::new(CountingStorage::default());
    let config = CacheConfig::default();
    let service = ServiceBuilder::new(storage.clone())
        .with_cache(Arc::new(MemoryCache::default()), &config)
        .with_logging()
        .build();

    service.search_page("k", 1.0, 10, None).await.unwrap();
    service.search_page("k", 1.0, 10, None).await.unwrap();
    assert_eq!(storage.searches(), 2);
}

#[tokio::test]
async fn test_builder_full_stack() {
    let storage = Arc::new(CountingStorage::default());
    let service = ServiceBuilder::new(storage.clone())
        .with_deadline(Duration::from_secs(5))
        .with_cache(Arc::new(MemoryCache::new(100)), &enabled())
        .with_logging()
        .build();

    let id = service.create("k", Op::Gte, 1.0).await.unwrap();
    assert_eq!(service.search_page("k", 2.0, 10, None).await.unwrap(), vec![id]);
    assert_eq!(service.search_page("k", 2.0, 10, None).await.unwrap(), vec![id]);
    assert_eq!(storage.searches(), 1);

    service.lock_create(id).await.unwrap();
    service.unlock_create(id).await.unwrap();
    service.delete(id).await.unwrap();
    assert!(service.search_page("k", 2.0, 10, None).await.unwrap().is_empty());
}
