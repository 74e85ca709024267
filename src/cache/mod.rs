//! Cache layer
//!
//! Leaderboards and ranking queries are cached in-process (moka) under
//! colon-separated keys such as `leaderboard:global` or
//! `leaderboard:challenge:12`. Writers evict by key or glob pattern after
//! their transaction commits.
//!
//! Setting `cache.ttl_seconds` to 0 disables caching entirely.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;

/// Cache layer trait
///
/// The methods are generic, so this trait is not object safe. Use the
/// `Cache` enum for runtime polymorphism.
#[async_trait]
pub trait CacheLayer: Send + Sync {
    /// Get a value from cache
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>>;

    /// Set a value in cache with TTL
    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration)
        -> Result<()>;

    /// Delete a value from cache
    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete all values matching a glob pattern
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;

    /// Clear all cache entries
    async fn clear(&self) -> Result<()>;
}

pub use memory::MemoryCache;

/// Runtime-selected cache implementation
#[derive(Debug)]
pub enum Cache {
    /// In-memory cache using moka
    Memory(MemoryCache),
    /// Caching switched off: every read misses, writes are dropped
    Disabled,
}

#[async_trait]
impl CacheLayer for Cache {
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        match self {
            Cache::Memory(cache) => cache.get(key).await,
            Cache::Disabled => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.set(key, value, ttl).await,
            Cache::Disabled => Ok(()),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete(key).await,
            Cache::Disabled => Ok(()),
        }
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.delete_pattern(pattern).await,
            Cache::Disabled => Ok(()),
        }
    }

    async fn clear(&self) -> Result<()> {
        match self {
            Cache::Memory(cache) => cache.clear().await,
            Cache::Disabled => Ok(()),
        }
    }
}

/// Create a cache instance based on configuration
pub fn create_cache(config: &CacheConfig) -> Arc<Cache> {
    if config.ttl_seconds == 0 {
        tracing::info!("Cache disabled (ttl_seconds = 0)");
        return Arc::new(Cache::Disabled);
    }

    let ttl = Duration::from_secs(config.ttl_seconds);
    Arc::new(Cache::Memory(MemoryCache::with_capacity_and_ttl(
        config.max_capacity,
        ttl,
    )))
}

/// Cache key helpers shared by the services that read and evict them
pub mod keys {
    pub const GLOBAL_LEADERBOARD: &str = "leaderboard:global";
    pub const GLOBAL_RANKINGS: &str = "leaderboard:rankings";
    pub const LEADERBOARD_PATTERN: &str = "leaderboard:*";

    pub fn challenge_leaderboard(challenge_id: i64) -> String {
        format!("leaderboard:challenge:{}", challenge_id)
    }

    pub fn user_leaderboard(user_id: i64) -> String {
        format!("leaderboard:user:{}", user_id)
    }

    pub fn leaderboard(leaderboard_id: i64) -> String {
        format!("leaderboard:{}", leaderboard_id)
    }

    pub fn user_rank(user_id: i64) -> String {
        format!("user_rank:{}:global", user_id)
    }

    pub fn user_rank_pattern(user_id: i64) -> String {
        format!("user_rank:{}:*", user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_memory_cache() {
        let cache = create_cache(&CacheConfig::default());

        cache
            .set("test_key", &"test_value".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        let result: Option<String> = cache.get("test_key").await.unwrap();
        assert_eq!(result, Some("test_value".to_string()));
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let config = CacheConfig {
            ttl_seconds: 0,
            max_capacity: 10,
        };
        let cache = create_cache(&config);
        assert!(matches!(*cache, Cache::Disabled));

        cache.set("k", &1u8, Duration::from_secs(60)).await.unwrap();
        let result: Option<u8> = cache.get("k").await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_key_helpers() {
        assert_eq!(keys::challenge_leaderboard(3), "leaderboard:challenge:3");
        assert_eq!(keys::user_leaderboard(9), "leaderboard:user:9");
        assert_eq!(keys::leaderboard(2), "leaderboard:2");
        assert_eq!(keys::user_rank(5), "user_rank:5:global");
        assert_eq!(keys::user_rank_pattern(5), "user_rank:5:*");
    }
}
