//! In-memory cache implementation using moka
//!
//! Values are stored as JSON so any serializable type fits. Each entry
//! carries its own TTL through a moka [`Expiry`] policy.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::{future::Cache, Expiry};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MAX_CAPACITY: u64 = 10_000;

const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone)]
struct CacheEntry {
    data: Arc<String>,
    ttl: Duration,
}

impl CacheEntry {
    fn new<T: Serialize>(value: &T, ttl: Duration) -> Result<Self> {
        let json = serde_json::to_string(value).context("Failed to serialize cache value")?;
        Ok(Self {
            data: Arc::new(json),
            ttl,
        })
    }

    fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).context("Failed to deserialize cache value")
    }
}

/// Expire each entry after the TTL it was stored with
struct EntryTtl;

impl Expiry<String, CacheEntry> for EntryTtl {
    fn expire_after_create(&self, _key: &String, value: &CacheEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
    default_ttl: Duration,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.cache.entry_count())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_capacity_and_ttl(max_capacity: u64, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryTtl)
            .build();

        Self { cache, default_ttl }
    }

    /// TTL used by [`MemoryCache::set_default`]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Store with the configured default TTL
    pub async fn set_default<T: Serialize + Send + Sync>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, value, self.default_ttl).await
    }

    /// Glob match supporting `*` (any run) and `?` (one character)
    ///
    /// - `stats:*` matches `stats:cities`, `stats:region:7`
    /// - `user:?:profile` matches `user:1:profile`
    fn pattern_matches(pattern: &str, key: &str) -> bool {
        let pattern: Vec<char> = pattern.chars().collect();
        let key: Vec<char> = key.chars().collect();

        // Iterative matcher with single-star backtracking
        let (mut p, mut k) = (0, 0);
        let mut star: Option<(usize, usize)> = None;
        while k < key.len() {
            if p < pattern.len() && (pattern[p] == '?' || pattern[p] == key[k]) {
                p += 1;
                k += 1;
            } else if p < pattern.len() && pattern[p] == '*' {
                star = Some((p, k));
                p += 1;
            } else if let Some((sp, sk)) = star {
                p = sp + 1;
                k = sk + 1;
                star = Some((sp, sk + 1));
            } else {
                return false;
            }
        }
        pattern[p..].iter().all(|c| *c == '*')
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheLayer for MemoryCache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self.cache.get(key).await {
            Some(entry) => Ok(Some(entry.deserialize()?)),
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(value, ttl)?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| Self::pattern_matches(pattern, key.as_ref()))
            .map(|(key, _)| (*key).clone())
            .collect();

        tracing::debug!(pattern, count = keys.len(), "Invalidating cache entries");
        for key in keys {
            self.cache.invalidate(&key).await;
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryCache::new();
        cache.set("stats:cities", &1117_i64, Duration::from_secs(60)).await.unwrap();

        let hit: Option<i64> = cache.get("stats:cities").await.unwrap();
        assert_eq!(hit, Some(1117));
        let miss: Option<i64> = cache.get("stats:regions").await.unwrap();
        assert_eq!(miss, None);
    }

    #[tokio::test]
    async fn test_per_entry_ttl() {
        let cache = MemoryCache::new();
        cache.set("short", &"a", Duration::from_millis(20)).await.unwrap();
        cache.set("long", &"b", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        cache.cache.run_pending_tasks().await;

        assert_eq!(cache.get::<String>("short").await.unwrap(), None);
        assert_eq!(cache.get::<String>("long").await.unwrap(), Some("b".to_string()));
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let cache = MemoryCache::new();
        for key in ["stats:cities", "stats:region:1", "session:x"] {
            cache.set_default(key, &1).await.unwrap();
        }

        cache.delete_pattern("stats:*").await.unwrap();

        assert_eq!(cache.get::<i32>("stats:cities").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("stats:region:1").await.unwrap(), None);
        assert_eq!(cache.get::<i32>("session:x").await.unwrap(), Some(1));
    }

    #[test]
    fn test_pattern_matches() {
        assert!(MemoryCache::pattern_matches("stats:*", "stats:region:7"));
        assert!(MemoryCache::pattern_matches("user:?:profile", "user:1:profile"));
        assert!(MemoryCache::pattern_matches("*", ""));
        assert!(!MemoryCache::pattern_matches("stats:?", "stats:12"));
        assert!(!MemoryCache::pattern_matches("stats:*", "statistics"));
    }

    proptest! {
        #[test]
        fn prop_prefix_star_matches_any_suffix(prefix in "[a-z:]{0,10}", suffix in "[a-z0-9:]{0,10}") {
            let key = format!("{}{}", prefix, suffix);
            let pattern = format!("{}*", prefix);
            prop_assert!(MemoryCache::pattern_matches(&pattern, &key));
        }
    }
}
