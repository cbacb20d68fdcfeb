//! Tiering, fail-open and invalidation behavior of `MultiLevelCache`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tiered_cache::{
    CacheConfig, CacheError, CacheKey, CacheStore, MemoryStore, MultiLevelCache, StoredValue,
};

/// Wraps a `MemoryStore` and counts L2 reads.
#[derive(Default)]
struct CountingStore {
    inner: MemoryStore,
    reads: AtomicUsize,
}

#[async_trait]
impl CacheStore for CountingStore {
    async fn get(&self, key: &str) -> Result<Option<StoredValue>, CacheError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.inner.set(key, value, ttl).await
    }
    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.inner.delete(key).await
    }
    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        self.inner.delete_matching(pattern).await
    }
}

/// Every call fails as if the backend were unreachable.
struct UnreachableStore;

#[async_trait]
impl CacheStore for UnreachableStore {
    async fn get(&self, _key: &str) -> Result<Option<StoredValue>, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
    async fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
    async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
    async fn delete_matching(&self, _pattern: &str) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("connection refused".into()))
    }
}

fn cache_with(store: Arc<dyn CacheStore>) -> MultiLevelCache {
    MultiLevelCache::new(CacheConfig::default().with_namespace("test"), Some(store))
}

#[tokio::test]
async fn test_set_then_get_served_from_l1() {
    let store = Arc::new(CountingStore::default());
    let cache = cache_with(store.clone());

    cache.set("k", &"v".to_string(), Duration::from_secs(3600)).await;
    let value: Option<String> = cache.get("k").await;

    assert_eq!(value.as_deref(), Some("v"));
    assert_eq!(store.reads.load(Ordering::SeqCst), 0);
    assert_eq!(cache.stats().l1_hits, 1);
}

#[tokio::test]
async fn test_l1_eviction_falls_back_to_l2_and_repopulates() {
    let store = Arc::new(CountingStore::default());
    let cache = cache_with(store.clone());

    cache.set("k", &42u64, Duration::from_secs(3600)).await;
    assert!(cache.evict_local("k"));

    let value: Option<u64> = cache.get("k").await;
    assert_eq!(value, Some(42));
    assert_eq!(store.reads.load(Ordering::SeqCst), 1);

    // promoted back into L1
    let value: Option<u64> = cache.get("k").await;
    assert_eq!(value, Some(42));
    assert_eq!(store.reads.load(Ordering::SeqCst), 1);

    let stats = cache.stats();
    assert_eq!(stats.l2_hits, 1);
    assert_eq!(stats.l1_hits, 1);
}

#[tokio::test]
async fn test_l2_keys_are_namespaced() {
    let store = Arc::new(MemoryStore::new());
    let cache = cache_with(store.clone());

    cache.set(&CacheKey::gas_price(137), &30u64, Duration::from_secs(15)).await;

    assert!(store.get("test:gas:137").await.unwrap().is_some());
    assert!(store.get("gas:137").await.unwrap().is_none());
}

#[tokio::test]
async fn test_promoted_l1_entry_does_not_outlive_l2() {
    let store = Arc::new(MemoryStore::new());
    let cache = cache_with(store.clone());

    cache.set("short", &1u8, Duration::from_millis(50)).await;
    cache.evict_local("short");
    assert_eq!(cache.get::<u8>("short").await, Some(1));

    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(cache.get::<u8>("short").await, None);
}

#[tokio::test]
async fn test_unreachable_l2_is_fail_open() {
    let cache = cache_with(Arc::new(UnreachableStore));

    cache.set("k", &"v".to_string(), Duration::from_secs(60)).await;
    // L1 write survives the failed L2 write
    assert_eq!(cache.get::<String>("k").await.as_deref(), Some("v"));

    cache.clear_local();
    assert_eq!(cache.get::<String>("k").await, None);
    assert_eq!(cache.invalidate("k").await, 0);
    cache.delete("k").await;

    let fetched: Result<u32, std::io::Error> =
        cache.get_or_set("computed", Duration::from_secs(60), || async { Ok(7) }).await;
    assert_eq!(fetched.unwrap(), 7);
}

#[tokio::test]
async fn test_invalidate_pattern_clears_both_tiers() {
    let store = Arc::new(MemoryStore::new());
    let cache = cache_with(store.clone());
    let ttl = Duration::from_secs(600);

    cache.set(&CacheKey::user_profile("0xabc"), &1u32, ttl).await;
    cache.set(&CacheKey::user_activity("0xabc"), &2u32, ttl).await;
    cache.set(&CacheKey::user_profile("0xdef"), &3u32, ttl).await;
    cache.set(&CacheKey::feed("0xabc"), &4u32, ttl).await;

    let removed = cache.invalidate("user:0xabc").await;
    // two logical keys, one entry in each tier
    assert_eq!(removed, 4);

    assert_eq!(cache.get::<u32>(&CacheKey::user_profile("0xabc")).await, None);
    assert_eq!(cache.get::<u32>(&CacheKey::user_activity("0xabc")).await, None);
    assert_eq!(cache.get::<u32>(&CacheKey::user_profile("0xdef")).await, Some(3));
    assert_eq!(cache.get::<u32>(&CacheKey::feed("0xabc")).await, Some(4));

    cache.clear_local();
    assert_eq!(cache.get::<u32>(&CacheKey::user_profile("0xabc")).await, None);
    assert_eq!(cache.get::<u32>(&CacheKey::user_profile("0xdef")).await, Some(3));
}

#[tokio::test]
async fn test_get_or_set_fetches_once() {
    let cache = MultiLevelCache::new(CacheConfig::default(), None);
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        let value: Result<String, std::io::Error> = cache
            .get_or_set("once", Duration::from_secs(60), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("fresh".to_string())
            })
            .await;
        assert_eq!(value.unwrap(), "fresh");
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.sets, 1);
    assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_get_or_set_propagates_fetch_error_without_caching() {
    let cache = MultiLevelCache::new(CacheConfig::default(), None);

    let failed: Result<u32, String> = cache
        .get_or_set("k", Duration::from_secs(60), || async { Err("rpc down".to_string()) })
        .await;
    assert_eq!(failed.unwrap_err(), "rpc down");
    assert_eq!(cache.stats().sets, 0);
}
