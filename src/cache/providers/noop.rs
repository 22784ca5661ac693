use async_trait::async_trait;
use std::time::Duration;

use crate::cache::errors::CacheResult;
use crate::cache::traits::CacheService;

/// Cache that never stores anything
#[derive(Debug, Clone, Default)]
pub struct NoOpCacheService;

#[async_trait]
impl CacheService for NoOpCacheService {
    async fn get(&self, _key: &str) -> CacheResult<Option<String>> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> CacheResult<()> {
        Ok(())
    }

    async fn invalidate(&self, _key: &str) -> CacheResult<()> {
        Ok(())
    }

    async fn invalidate_prefix(&self, _prefix: &str) -> CacheResult<u64> {
        Ok(0)
    }

    fn provider_name(&self) -> &'static str {
        "noop"
    }
}
