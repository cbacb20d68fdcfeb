//! Two-level cache-aside tier.
//!
//! - L1: bounded per-process LRU with per-entry expiry ([`LocalCache`])
//! - L2: shared cross-process store behind the [`CacheStore`] trait
//!   ([`MemoryStore`] in-process, `RedisStore` with the `redis` feature)
//!
//! Every cache operation is fail-open: backend errors are logged and
//! reported as misses, never returned to the caller.
//!
//! # Usage
//!
//! ```ignore
//! use tiered_cache::{CacheConfig, CacheKey, MemoryStore, MultiLevelCache, Ttl};
//!
//! let cache = MultiLevelCache::new(CacheConfig::default(), Some(Arc::new(MemoryStore::new())));
//! cache.set(&CacheKey::gas_price(137), &gas_price, Ttl::GAS_PRICE).await;
//! let price: Option<u128> = cache.get(&CacheKey::gas_price(137)).await;
//! ```

mod config;
mod error;
mod keys;
mod local;
mod multi_level;
mod store;

#[cfg(feature = "redis")]
mod redis_store;

pub use config::{redis_url_from_env, CacheConfig};
pub use error::CacheError;
pub use keys::{CacheKey, Ttl};
pub use local::LocalCache;
pub use multi_level::{CacheStats, MultiLevelCache};
pub use store::{escape_glob, glob_match, CacheStore, MemoryStore, StoredValue};

#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
