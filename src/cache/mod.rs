//! Cache layer
//!
//! Process-local moka cache for reference counts that rarely change
//! (cities per region, totals). Admin writes invalidate by key pattern.
//!
//! ```rust,ignore
//! use moi_goroda::cache::{create_cache, CacheLayer};
//!
//! let cache = create_cache(&config.cache);
//! cache.set("stats:cities", &1117_i64, Duration::from_secs(60)).await?;
//! cache.delete_pattern("stats:*").await?;
//! ```

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

pub use memory::MemoryCache;

/// Cache operations.
///
/// The generic methods keep this trait from being object safe; share the
/// concrete [`MemoryCache`] behind an `Arc` instead.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key matching a glob pattern (`*`, `?`)
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// Build the shared cache from configuration
pub fn create_cache(config: &CacheConfig) -> Arc<MemoryCache> {
    tracing::info!(
        ttl_seconds = config.ttl_seconds,
        max_capacity = config.max_capacity,
        "Using in-memory cache"
    );
    Arc::new(MemoryCache::with_capacity_and_ttl(
        config.max_capacity,
        Duration::from_secs(config.ttl_seconds),
    ))
}

/// Cached value for `key`, computing and storing it on a miss.
///
/// Cache failures are logged and fall through to `load`.
pub async fn get_or_load<T, F, Fut>(cache: &MemoryCache, key: &str, load: F) -> Result<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    match cache.get::<T>(key).await {
        Ok(Some(value)) => return Ok(value),
        Ok(None) => {}
        Err(e) => tracing::warn!(key, "Cache read failed: {:#}", e),
    }

    let value = load().await?;
    if let Err(e) = cache.set_default(key, &value).await {
        tracing::warn!(key, "Cache write failed: {:#}", e);
    }
    Ok(value)
}
