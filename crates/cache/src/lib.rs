//! Key-value cache with per-key expiry.
//!
//! The [`Cache`] trait is implemented by [`InMemoryCache`] for tests and local
//! runs and by [`RedisCache`] for deployments.

pub mod cache;
pub mod error;
pub mod memory;
pub mod redis_cache;

pub use cache::Cache;
pub use error::{CacheError, Result};
pub use memory::InMemoryCache;
pub use redis_cache::RedisCache;
