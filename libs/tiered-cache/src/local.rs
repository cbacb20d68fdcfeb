//! L1 tier: bounded per-process LRU with per-entry expiry.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use parking_lot::Mutex;

#[derive(Debug, Clone)]
struct LocalEntry {
    value: String,
    expires_at: Instant,
}

impl LocalEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Thread-safe LRU of serialized values.
///
/// Expired entries are dropped when touched; they still count towards
/// capacity until then, so LRU eviction reclaims them under pressure.
pub struct LocalCache {
    entries: Mutex<LruCache<String, LocalEntry>>,
}

impl LocalCache {
    /// A zero capacity is treated as one.
    pub fn new(max_keys: usize) -> Self {
        let cap = NonZeroUsize::new(max_keys).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Some(entry.value.clone()),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    /// Insert with `ttl`. A zero TTL removes any existing entry instead.
    pub fn insert(&self, key: &str, value: String, ttl: Duration) {
        let mut entries = self.entries.lock();
        if ttl.is_zero() {
            entries.pop(key);
            return;
        }
        entries.put(
            key.to_string(),
            LocalEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().pop(key).is_some()
    }

    /// Remove every key containing `pattern`. Returns the number removed.
    pub fn remove_matching(&self, pattern: &str) -> usize {
        let mut entries = self.entries.lock();
        let doomed: Vec<String> = entries
            .iter()
            .filter(|(key, _)| key.contains(pattern))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            entries.pop(key);
        }
        doomed.len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Includes expired entries not yet touched.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
