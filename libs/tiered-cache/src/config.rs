use std::time::Duration;

/// Environment variable overriding the L2 key namespace
pub const CACHE_NAMESPACE_ENV: &str = "CACHE_NAMESPACE";

/// Environment variable overriding the L1 key capacity
pub const CACHE_L1_MAX_KEYS_ENV: &str = "CACHE_L1_MAX_KEYS";

/// Configuration for [`crate::MultiLevelCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Prefix applied to every L2 key (`<namespace>:<key>`)
    pub namespace: String,
    /// Maximum number of L1 entries before LRU eviction
    pub l1_max_keys: usize,
    /// Ceiling applied to L1 TTLs on write
    pub l1_max_ttl: Duration,
    /// Ceiling applied to L1 TTLs when promoting an L2 hit
    pub l1_promote_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "cache".to_string(),
            l1_max_keys: 1000,
            l1_max_ttl: Duration::from_secs(300),
            l1_promote_ttl: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Apply `CACHE_NAMESPACE` / `CACHE_L1_MAX_KEYS` on top of the current values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(ns) = std::env::var(CACHE_NAMESPACE_ENV) {
            if !ns.trim().is_empty() {
                self.namespace = ns.trim().to_string();
            }
        }
        if let Some(max) = std::env::var(CACHE_L1_MAX_KEYS_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|v| *v > 0)
        {
            self.l1_max_keys = max;
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_l1_max_keys(mut self, max: usize) -> Self {
        self.l1_max_keys = max;
        self
    }
}

/// Resolve the L2 connection string.
///
/// `REDIS_URL` wins; otherwise one is assembled from `REDIS_HOST`,
/// `REDIS_PORT` (default 6379) and optional `REDIS_PASSWORD`.
pub fn redis_url_from_env() -> Option<String> {
    if let Ok(url) = std::env::var("REDIS_URL") {
        if !url.trim().is_empty() {
            return Some(url);
        }
    }

    let host = std::env::var("REDIS_HOST").ok().filter(|h| !h.is_empty())?;
    let port = std::env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
    let url = match std::env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()) {
        Some(password) => format!("redis://:{}@{}:{}", password, host, port),
        None => format!("redis://{}:{}", host, port),
    };
    Some(url)
}
