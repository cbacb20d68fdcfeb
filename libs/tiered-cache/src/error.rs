/// Errors raised by cache backends.
///
/// These never escape [`crate::MultiLevelCache`]; they are logged and the
/// operation degrades to a miss.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache backend error: {0}")]
    Backend(String),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
            CacheError::Unavailable(err.to_string())
        } else {
            CacheError::Backend(err.to_string())
        }
    }
}
