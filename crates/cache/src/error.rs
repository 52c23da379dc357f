use thiserror::Error;

/// Errors that can occur when talking to the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache backend rejected a command or the connection failed.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A TTL that would not expire the entry was requested.
    #[error("Invalid TTL: {0:?} (must be at least one second)")]
    InvalidTtl(std::time::Duration),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
