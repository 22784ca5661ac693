//! In-memory cache provider using Moka.
//!
//! Not distributed: each process keeps its own entries. Entries carry their
//! own TTL through a moka [`Expiry`] policy.

use async_trait::async_trait;
use moka::Expiry;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::cache::errors::CacheResult;
use crate::cache::traits::CacheService;
use crate::config::CacheConfig;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

#[derive(Clone)]
pub struct MokaCacheService {
    cache: moka::future::Cache<String, Entry>,
}

impl std::fmt::Debug for MokaCacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaCacheService")
            .field("max_capacity", &self.cache.policy().max_capacity())
            .field("entry_count", &self.cache.entry_count())
            .finish()
    }
}

impl MokaCacheService {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_capacity)
    }

    pub fn new(max_capacity: u64) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        debug!(max_capacity = max_capacity, "Moka in-memory cache service created");
        Self { cache }
    }
}

#[async_trait]
impl CacheService for MokaCacheService {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let result = self.cache.get(key).await.map(|entry| entry.value);
        debug!(key = key, hit = result.is_some(), "Cache GET (moka)");
        Ok(result)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        self.cache.insert(key.to_string(), Entry { value, ttl }).await;
        debug!(key = key, ttl_ms = ttl.as_millis() as u64, "Cache SET (moka)");
        Ok(())
    }

    async fn invalidate(&self, key: &str) -> CacheResult<()> {
        self.cache.invalidate(key).await;
        debug!(key = key, "Cache DEL (moka)");
        Ok(())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> CacheResult<u64> {
        let matching: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.as_ref().clone())
            .collect();

        for key in &matching {
            self.cache.invalidate(key).await;
        }
        debug!(prefix = prefix, removed = matching.len(), "Cache prefix DEL (moka)");
        Ok(matching.len() as u64)
    }

    fn provider_name(&self) -> &'static str {
        "moka"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{get_json, keys, set_json};
    use crate::models::EntityKey;

    #[tokio::test]
    async fn test_moka_get_returns_none_on_miss() {
        let svc = MokaCacheService::new(100);
        assert_eq!(svc.get("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_moka_set_and_get_json() {
        let svc = MokaCacheService::new(100);
        set_json(&svc, "counts", &vec![1, 2, 3], Duration::from_secs(60))
            .await
            .unwrap();
        let counts: Option<Vec<i32>> = get_json(&svc, "counts").await.unwrap();
        assert_eq!(counts, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_moka_per_entry_ttl() {
        let svc = MokaCacheService::new(100);
        svc.set("short", "v".into(), Duration::from_millis(30))
            .await
            .unwrap();
        svc.set("long", "v".into(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(svc.get("short").await.unwrap().is_none());
        assert!(svc.get("long").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_prefix_invalidation_is_entity_scoped() {
        let svc = MokaCacheService::new(100);
        let ttl = Duration::from_secs(60);
        svc.set(&keys::host_key(1, "a"), "1".into(), ttl).await.unwrap();
        svc.set(&keys::health_key(&EntityKey::Stack(1)), "h".into(), ttl)
            .await
            .unwrap();
        svc.set(&keys::host_key(11, "a"), "11".into(), ttl)
            .await
            .unwrap();

        let removed = svc.invalidate_prefix(&keys::stack_key(1)).await.unwrap();
        assert_eq!(removed, 2);
        assert!(svc.get(&keys::host_key(1, "a")).await.unwrap().is_none());
        assert_eq!(
            svc.get(&keys::host_key(11, "a")).await.unwrap(),
            Some("11".to_string())
        );
    }
}
