//! Cache service trait definition

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use super::errors::CacheResult;

/// Async cache operations over string values.
///
/// Structured values go through [`get_json`] / [`set_json`].
#[async_trait]
pub trait CacheService: Send + Sync + std::fmt::Debug {
    /// `Ok(Some(value))` on hit, `Ok(None)` on miss or expiry
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Store a value that expires after `ttl`
    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;

    async fn invalidate(&self, key: &str) -> CacheResult<()>;

    /// Remove every key starting with `prefix`; returns how many were removed
    async fn invalidate_prefix(&self, prefix: &str) -> CacheResult<u64>;

    fn provider_name(&self) -> &'static str;
}

/// Read and deserialize a JSON value
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn CacheService,
    key: &str,
) -> CacheResult<Option<T>> {
    match cache.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Serialize and store a JSON value
pub async fn set_json<T: Serialize + Sync>(
    cache: &dyn CacheService,
    key: &str,
    value: &T,
    ttl: Duration,
) -> CacheResult<()> {
    cache.set(key, serde_json::to_string(value)?, ttl).await
}
