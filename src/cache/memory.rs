//! In-memory cache implementation using moka
//!
//! Entries are stored as JSON strings so any serialisable value can be
//! cached. Each entry carries its own TTL, enforced through a moka `Expiry`
//! policy, and keys can be evicted in bulk with glob patterns.

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default maximum cache capacity (number of entries)
const DEFAULT_MAX_CAPACITY: u64 = 10_000;

/// Default TTL for cache entries
const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Serialized value plus the TTL it was stored with
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

/// Expires each entry after the TTL it was inserted with
struct PerEntryExpiry;

impl Expiry<String, CacheEntry> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
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

/// In-memory cache using moka
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
    /// Create a new memory cache with default capacity and TTL
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_MAX_CAPACITY, DEFAULT_TTL)
    }

    /// Create a new memory cache with custom capacity and default TTL
    pub fn with_capacity_and_ttl(max_capacity: u64, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryExpiry)
            .build();

        Self { cache, default_ttl }
    }

    /// TTL used by callers that do not pick their own
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Get the current number of entries in the cache
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Glob match where `*` is any run of characters and `?` is exactly one.
    ///
    /// `leaderboard:*` matches `leaderboard:global` and `leaderboard:challenge:7`.
    fn pattern_matches(pattern: &str, key: &str) -> bool {
        let pattern_chars: Vec<char> = pattern.chars().collect();
        let key_chars: Vec<char> = key.chars().collect();
        Self::glob_match(&pattern_chars, &key_chars)
    }

    fn glob_match(pattern: &[char], key: &[char]) -> bool {
        match pattern.split_first() {
            None => key.is_empty(),
            Some(('*', rest)) => {
                (0..=key.len()).any(|skip| Self::glob_match(rest, &key[skip..]))
            }
            Some(('?', rest)) => !key.is_empty() && Self::glob_match(rest, &key[1..]),
            Some((c, rest)) => key.first() == Some(c) && Self::glob_match(rest, &key[1..]),
        }
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

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let entry = CacheEntry::new(value, ttl)?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        // Walks every key; fine for the few hundred leaderboard keys we hold.
        let keys_to_delete: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| Self::pattern_matches(pattern, key.as_ref()))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in keys_to_delete {
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

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = MemoryCache::new();
        cache
            .set("key1", &"value1".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let result: Option<String> = cache.get("key1").await.unwrap();
        assert_eq!(result, Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let cache = MemoryCache::new();
        let result: Option<String> = cache.get("missing").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_per_entry_ttl() {
        let cache = MemoryCache::with_capacity_and_ttl(100, Duration::from_secs(3600));
        cache
            .set("short", &1u32, Duration::from_millis(10))
            .await
            .unwrap();
        cache
            .set("long", &2u32, Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        cache.cache.run_pending_tasks().await;

        let short: Option<u32> = cache.get("short").await.unwrap();
        let long: Option<u32> = cache.get("long").await.unwrap();
        assert_eq!(short, None);
        assert_eq!(long, Some(2));
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("leaderboard:global", &1, ttl).await.unwrap();
        cache.set("leaderboard:challenge:3", &2, ttl).await.unwrap();
        cache.set("user_rank:1:points", &3, ttl).await.unwrap();

        cache.delete_pattern("leaderboard:*").await.unwrap();

        let a: Option<i32> = cache.get("leaderboard:global").await.unwrap();
        let b: Option<i32> = cache.get("leaderboard:challenge:3").await.unwrap();
        let c: Option<i32> = cache.get("user_rank:1:points").await.unwrap();
        assert!(a.is_none());
        assert!(b.is_none());
        assert_eq!(c, Some(3));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = MemoryCache::new();
        cache.set("a", &1, Duration::from_secs(60)).await.unwrap();
        cache.clear().await.unwrap();
        let a: Option<i32> = cache.get("a").await.unwrap();
        assert!(a.is_none());
    }

    #[test]
    fn test_pattern_matches() {
        assert!(MemoryCache::pattern_matches("leaderboard:*", "leaderboard:global"));
        assert!(MemoryCache::pattern_matches("user_rank:?:*", "user_rank:7:points"));
        assert!(MemoryCache::pattern_matches("*", ""));
        assert!(!MemoryCache::pattern_matches("leaderboard:*", "badges:1"));
        assert!(!MemoryCache::pattern_matches("a?c", "ac"));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(30))]

            /// A literal key always matches itself and a trailing `*` after any prefix.
            #[test]
            fn prefix_star_matches(key in "[a-z:0-9]{0,20}", cut in 0usize..20) {
                let cut = cut.min(key.len());
                let pattern = format!("{}*", &key[..cut]);
                prop_assert!(MemoryCache::pattern_matches(&key, &key));
                prop_assert!(MemoryCache::pattern_matches(&pattern, &key));
            }

            /// Values read back after a set are equal to what was stored.
            #[test]
            fn set_then_get_returns_value(key in "[a-z]{1,10}", value in "[a-z ]{0,50}") {
                tokio_test::block_on(async {
                    let cache = MemoryCache::new();
                    cache.set(&key, &value, Duration::from_secs(60)).await.unwrap();
                    let got: Option<String> = cache.get(&key).await.unwrap();
                    assert_eq!(got, Some(value.clone()));
                });
            }
        }
    }
}
