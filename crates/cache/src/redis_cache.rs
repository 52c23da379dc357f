//! Redis-backed cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use crate::{
    Result,
    cache::{Cache, check_ttl},
};

/// Redis cache using a `ConnectionManager` for reconnecting, multiplexed access.
#[derive(Clone)]
pub struct RedisCache {
    conn_manager: ConnectionManager,
}

impl RedisCache {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is invalid or the first connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await?;
        tracing::info!("connected to redis");
        Ok(Self { conn_manager })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn_manager.clone();
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let secs = check_ttl(ttl)?;
        let mut conn = self.conn_manager.clone();
        let _: () = conn.set_ex(key, value, secs).await?;
        Ok(())
    }

    async fn set_many_ex(&self, entries: &[(String, String)], ttl: Duration) -> Result<()> {
        let secs = check_ttl(ttl)?;
        if entries.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.set_ex(key, value, secs).ignore();
        }

        let mut conn = self.conn_manager.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn_manager.clone();
        Ok(conn.del(keys).await?)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.conn_manager.clone();
        // -2 means missing, -1 means no expiry.
        let secs: i64 = conn.ttl(key).await?;
        Ok(u64::try_from(secs).ok().map(Duration::from_secs))
    }
}
