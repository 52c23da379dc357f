use std::time::Duration;

use async_trait::async_trait;

use crate::{CacheError, Result};

/// A string key-value cache where every written entry carries a TTL.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Reads a live entry.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Writes an entry that expires after `ttl`, replacing any previous value and TTL.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Writes several entries with the same TTL as one batch.
    ///
    /// Each entry overwrites its key; nothing is incremented.
    async fn set_many_ex(&self, entries: &[(String, String)], ttl: Duration) -> Result<()>;

    /// Removes entries, returning how many existed.
    async fn del(&self, keys: &[String]) -> Result<u64>;

    /// Returns the remaining lifetime of a live entry.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>>;
}

/// Rejects TTLs below the one-second resolution shared by every backend.
pub(crate) fn check_ttl(ttl: Duration) -> Result<u64> {
    match ttl.as_secs() {
        0 => Err(CacheError::InvalidTtl(ttl)),
        secs => Ok(secs),
    }
}
