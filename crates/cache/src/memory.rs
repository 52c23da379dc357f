use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::{
    Result,
    cache::{Cache, check_ttl},
};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-memory cache for testing and local runs.
///
/// Expiry follows `tokio::time`, so paused-clock tests can advance past a TTL.
/// Expired entries are purged on every write.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryCache {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    /// Returns true if there are no live entries.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns every live key, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<_> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(_, e)| e.expires_at > now)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort();
        keys
    }
}

fn purge_expired(map: &mut HashMap<String, Entry>, now: Instant) {
    map.retain(|_, entry| entry.expires_at > now);
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let secs = check_ttl(ttl)?;
        let now = Instant::now();
        let mut map = self.entries.write().await;
        purge_expired(&mut map, now);
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + Duration::from_secs(secs),
            },
        );
        Ok(())
    }

    async fn set_many_ex(&self, entries: &[(String, String)], ttl: Duration) -> Result<()> {
        let secs = check_ttl(ttl)?;
        let now = Instant::now();
        let expires_at = now + Duration::from_secs(secs);
        let mut map = self.entries.write().await;
        purge_expired(&mut map, now);
        for (key, value) in entries {
            map.insert(
                key.clone(),
                Entry {
                    value: value.clone(),
                    expires_at,
                },
            );
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64> {
        let now = Instant::now();
        let mut map = self.entries.write().await;
        let removed = keys
            .iter()
            .filter_map(|k| map.remove(k))
            .filter(|e| e.expires_at > now)
            .count();
        Ok(removed as u64)
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.expires_at - now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CacheError;

    #[tokio::test]
    async fn set_and_get() {
        let cache = InMemoryCache::new();
        cache
            .set_ex("k", "v", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(cache.get("missing").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set_ex("k", "v", Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.ttl("k").await.unwrap(), Some(Duration::from_secs(1)));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.ttl("k").await.unwrap().is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn writes_purge_expired_entries() {
        let cache = InMemoryCache::new();
        cache
            .set_many_ex(
                &[("a".into(), "1".into()), ("b".into(), "2".into())],
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(11)).await;
        cache.set_ex("c", "3", Duration::from_secs(10)).await.unwrap();

        assert_eq!(cache.entries.read().await.len(), 1);
        assert_eq!(cache.keys().await, vec!["c".to_string()]);
    }

    #[tokio::test]
    async fn set_overwrites_value_and_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set_ex("k", "1", Duration::from_secs(100))
            .await
            .unwrap();
        cache.set_ex("k", "2", Duration::from_secs(5)).await.unwrap();

        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("2"));
        assert!(cache.ttl("k").await.unwrap().unwrap() <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn del_counts_live_entries() {
        let cache = InMemoryCache::new();
        cache
            .set_many_ex(
                &[("a".into(), "1".into()), ("b".into(), "2".into())],
                Duration::from_secs(10),
            )
            .await
            .unwrap();

        let removed = cache
            .del(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn sub_second_ttl_is_rejected() {
        let cache = InMemoryCache::new();
        let err = cache
            .set_ex("k", "v", Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidTtl(_)));
    }
}
