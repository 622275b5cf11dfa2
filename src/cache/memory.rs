//! In-process cache backed by moka
//!
//! Entries are stored as JSON so any serializable value fits, and each entry
//! carries its own TTL (dashboard stats live for seconds, profiles for
//! minutes).

use super::CacheLayer;
use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_MAX_CAPACITY: u64 = 10_000;

const DEFAULT_TTL: Duration = Duration::from_secs(600);

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

    fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.data).context("Failed to deserialize cache value")
    }
}

/// Expire each entry after the TTL it was stored with
struct PerEntryTtl;

impl Expiry<String, CacheEntry> for PerEntryTtl {
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

    /// `default_ttl` caps every entry; shorter per-entry TTLs still apply
    pub fn with_capacity_and_ttl(max_capacity: u64, default_ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache, default_ttl }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Glob match supporting `*` (any run) and `?` (one char)
    fn pattern_matches(pattern: &str, key: &str) -> bool {
        let p: Vec<char> = pattern.chars().collect();
        let k: Vec<char> = key.chars().collect();
        let (mut pi, mut ki) = (0, 0);
        // position of the last `*` and the key index it was tried at
        let mut backtrack: Option<(usize, usize)> = None;

        while ki < k.len() {
            if pi < p.len() && (p[pi] == '?' || p[pi] == k[ki]) {
                pi += 1;
                ki += 1;
            } else if pi < p.len() && p[pi] == '*' {
                backtrack = Some((pi, ki));
                pi += 1;
            } else if let Some((star, matched)) = backtrack {
                pi = star + 1;
                ki = matched + 1;
                backtrack = Some((star, matched + 1));
            } else {
                return false;
            }
        }
        p[pi..].iter().all(|c| *c == '*')
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
            Some(entry) => Ok(Some(entry.decode()?)),
            None => Ok(None),
        }
    }

    async fn set<T: Serialize + Send + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(value, ttl.min(self.default_ttl))?;
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<()> {
        let doomed: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| Self::pattern_matches(pattern, key.as_ref()))
            .map(|(key, _)| (*key).clone())
            .collect();
        for key in doomed {
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
    async fn test_set_get_delete() {
        let cache = MemoryCache::new();
        cache.set("profile:1", &"milonguero".to_string(), Duration::from_secs(60)).await.unwrap();

        let hit: Option<String> = cache.get("profile:1").await.unwrap();
        assert_eq!(hit.as_deref(), Some("milonguero"));

        cache.delete("profile:1").await.unwrap();
        let miss: Option<String> = cache.get("profile:1").await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_short_ttl_expires_before_default() {
        let cache = MemoryCache::with_capacity_and_ttl(100, Duration::from_secs(3600));
        cache.set("stats:dashboard", &42u64, Duration::from_millis(20)).await.unwrap();
        cache.set("profile:7", &7u64, Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        cache.cache.run_pending_tasks().await;

        let stats: Option<u64> = cache.get("stats:dashboard").await.unwrap();
        let profile: Option<u64> = cache.get("profile:7").await.unwrap();
        assert!(stats.is_none());
        assert_eq!(profile, Some(7));
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let cache = MemoryCache::new();
        for key in ["flag:new_feed", "flag:chat_v2", "profile:1"] {
            cache.set(key, &true, Duration::from_secs(60)).await.unwrap();
        }

        cache.delete_pattern("flag:*").await.unwrap();

        let flag: Option<bool> = cache.get("flag:new_feed").await.unwrap();
        let profile: Option<bool> = cache.get("profile:1").await.unwrap();
        assert!(flag.is_none());
        assert_eq!(profile, Some(true));
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = MemoryCache::new();
        cache.set("a", &1, Duration::from_secs(60)).await.unwrap();
        cache.set("b", &2, Duration::from_secs(60)).await.unwrap();
        cache.clear().await.unwrap();
        let a: Option<i32> = cache.get("a").await.unwrap();
        let b: Option<i32> = cache.get("b").await.unwrap();
        assert!(a.is_none() && b.is_none());
    }

    #[test]
    fn test_pattern_matches() {
        assert!(MemoryCache::pattern_matches("profile:*", "profile:12"));
        assert!(MemoryCache::pattern_matches("profile:*", "profile:"));
        assert!(MemoryCache::pattern_matches("*:12", "profile:12"));
        assert!(MemoryCache::pattern_matches("user:?:rooms", "user:1:rooms"));
        assert!(!MemoryCache::pattern_matches("user:?:rooms", "user:10:rooms"));
        assert!(MemoryCache::pattern_matches("a*b*c", "axxbyyc"));
        assert!(!MemoryCache::pattern_matches("a*b*c", "axxbyy"));
        assert!(!MemoryCache::pattern_matches("exact", "exactx"));
    }

    proptest! {
        #[test]
        fn prefix_star_matches_any_suffix(prefix in "[a-z:]{0,10}", suffix in "[a-z0-9:]{0,10}") {
            let pattern = format!("{}*", prefix);
            let key = format!("{}{}", prefix, suffix);
            prop_assert!(MemoryCache::pattern_matches(&pattern, &key));
        }

        #[test]
        fn literal_pattern_matches_only_itself(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
            prop_assert_eq!(MemoryCache::pattern_matches(&a, &b), a == b);
        }
    }
}
