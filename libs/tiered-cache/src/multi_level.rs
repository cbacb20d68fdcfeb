//! Cache-aside front over the L1 and L2 tiers.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::CacheConfig;
use crate::local::LocalCache;
use crate::store::{escape_glob, CacheStore};

/// Running counters, exposed for observability only.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub sets: u64,
    /// hits / (hits + misses), `0.0` before any read
    pub hit_rate: f64,
}

#[derive(Default)]
struct Counters {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
}

/// Two-level cache. All operations are fail-open.
pub struct MultiLevelCache {
    config: CacheConfig,
    local: LocalCache,
    remote: Option<Arc<dyn CacheStore>>,
    counters: Counters,
}

impl MultiLevelCache {
    /// Without a remote store the cache runs L1-only.
    pub fn new(config: CacheConfig, remote: Option<Arc<dyn CacheStore>>) -> Self {
        let local = LocalCache::new(config.l1_max_keys);
        Self {
            config,
            local,
            remote,
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn remote_key(&self, key: &str) -> String {
        format!("{}:{}", self.config.namespace, key)
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(raw) = self.local.get(key) {
            match serde_json::from_str(&raw) {
                Ok(value) => {
                    self.counters.l1_hits.fetch_add(1, Ordering::Relaxed);
                    return Some(value);
                }
                Err(e) => {
                    tracing::debug!(key, error = %e, "Dropping undecodable L1 entry");
                    self.local.remove(key);
                }
            }
        }

        if let Some(remote) = &self.remote {
            match remote.get(&self.remote_key(key)).await {
                Ok(Some(stored)) => match serde_json::from_str(&stored.value) {
                    Ok(value) => {
                        let ttl = stored
                            .ttl
                            .map_or(self.config.l1_promote_ttl, |t| t.min(self.config.l1_promote_ttl));
                        self.local.insert(key, stored.value, ttl);
                        self.counters.l2_hits.fetch_add(1, Ordering::Relaxed);
                        return Some(value);
                    }
                    Err(e) => {
                        tracing::debug!(key, error = %e, "Undecodable L2 entry treated as miss");
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(key, error = %e, "L2 read failed, treating as miss");
                }
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Write both tiers. L1 keeps at most `l1_max_ttl`, L2 the full `ttl`.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(key, error = %e, "Cache value not serializable, skipping set");
                return;
            }
        };

        self.counters.sets.fetch_add(1, Ordering::Relaxed);
        self.local
            .insert(key, raw.clone(), ttl.min(self.config.l1_max_ttl));

        if let Some(remote) = &self.remote {
            if let Err(e) = remote.set(&self.remote_key(key), &raw, ttl).await {
                tracing::debug!(key, error = %e, "L2 write failed");
            }
        }
    }

    pub async fn delete(&self, key: &str) {
        self.local.remove(key);
        if let Some(remote) = &self.remote {
            if let Err(e) = remote.delete(&self.remote_key(key)).await {
                tracing::debug!(key, error = %e, "L2 delete failed");
            }
        }
    }

    /// Remove every key containing `pattern` from both tiers.
    ///
    /// Returns the number of entries removed across tiers (the same logical
    /// key counts once per tier).
    pub async fn invalidate(&self, pattern: &str) -> usize {
        let mut removed = self.local.remove_matching(pattern);

        if let Some(remote) = &self.remote {
            let glob = format!(
                "{}:*{}*",
                escape_glob(&self.config.namespace),
                escape_glob(pattern)
            );
            match remote.delete_matching(&glob).await {
                Ok(n) => removed += n,
                Err(e) => tracing::debug!(pattern, error = %e, "L2 invalidation failed"),
            }
        }

        if removed > 0 {
            tracing::trace!(pattern, removed, "Invalidated cache entries");
        }
        removed
    }

    /// Cache-aside read. Fetch errors propagate; cache errors never do.
    pub async fn get_or_set<T, F, Fut, E>(&self, key: &str, ttl: Duration, fetch: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }
        let value = fetch().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }

    /// Drop `key` from L1 only.
    pub fn evict_local(&self, key: &str) -> bool {
        self.local.remove(key)
    }

    pub fn clear_local(&self) {
        self.local.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let l1_hits = self.counters.l1_hits.load(Ordering::Relaxed);
        let l2_hits = self.counters.l2_hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let sets = self.counters.sets.load(Ordering::Relaxed);
        let total = l1_hits + l2_hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            (l1_hits + l2_hits) as f64 / total as f64
        };

        CacheStats {
            l1_hits,
            l2_hits,
            misses,
            sets,
            hit_rate,
        }
    }
}
