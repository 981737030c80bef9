//! Cache backend implementations.

use super::key::CacheKey;
use crate::types::GenerationResponse;
use crate::{Error, Result};
use async_trait::async_trait;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Counters observed since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub insertions: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A response cache backend.
///
/// `get` and `put` are atomic with respect to each other. De-duplication of
/// concurrent misses is the router's job (singleflight), not the cache's.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Look up a key. Implementations must treat an entry past its TTL as
    /// absent and may remove it at that point.
    async fn get(&self, key: &CacheKey) -> Result<Option<GenerationResponse>>;
    async fn put(&self, key: &CacheKey, response: &GenerationResponse) -> Result<()>;
    async fn len(&self) -> Result<usize>;
    async fn clear(&self) -> Result<()>;
    fn stats(&self) -> CacheStats;
    fn name(&self) -> &'static str;
}

struct StoredEntry {
    response: GenerationResponse,
    created_at: Instant,
    hit_count: u64,
}

/// In-memory LRU cache with lazy TTL expiry.
///
/// A hit refreshes recency; a `put` at capacity evicts the single
/// least-recently-used entry. Expiry is checked on lookup only — there is no
/// background sweeper.
pub struct MemoryCache {
    entries: Mutex<LruCache<String, StoredEntry>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    insertions: AtomicU64,
    expirations: AtomicU64,
}

impl MemoryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("max(1) is non-zero");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            insertions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<String, StoredEntry>>> {
        self.entries
            .lock()
            .map_err(|_| Error::cache(self.name(), "lock poisoned"))
    }
}

#[async_trait]
impl ResponseCache for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<GenerationResponse>> {
        let mut entries = self.lock()?;
        let expired = entries
            .peek(key.as_str())
            .map(|e| e.created_at.elapsed() > self.ttl)
            .unwrap_or(false);
        if expired {
            entries.pop(key.as_str());
            self.expirations.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }
        match entries.get_mut(key.as_str()) {
            Some(entry) => {
                entry.hit_count += 1;
                self.hits.fetch_add(1, Ordering::Relaxed);
                let mut response = entry.response.clone();
                response.cached = true;
                Ok(Some(response))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &CacheKey, response: &GenerationResponse) -> Result<()> {
        let mut entries = self.lock()?;
        entries.put(
            key.as_str().to_string(),
            StoredEntry {
                response: response.clone(),
                created_at: Instant::now(),
                hit_count: 0,
            },
        );
        self.insertions.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    async fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            insertions: self.insertions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// No-op cache for disabling caching entirely.
pub struct NullCache;

impl NullCache {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NullCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseCache for NullCache {
    async fn get(&self, _: &CacheKey) -> Result<Option<GenerationResponse>> {
        Ok(None)
    }
    async fn put(&self, _: &CacheKey, _: &GenerationResponse) -> Result<()> {
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(0)
    }
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
    fn name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GenerationRequest, ProviderId, TokenUsage};

    fn response(content: &str) -> GenerationResponse {
        GenerationResponse {
            content: content.into(),
            provider: ProviderId::OpenAi,
            model_id: "test-model".into(),
            tokens_used: 3,
            latency_ms: 5,
            cached: false,
            usage: TokenUsage::new(1, 2),
        }
    }

    fn key(prompt: &str) -> CacheKey {
        CacheKey::for_request(&GenerationRequest::new(prompt))
    }

    #[tokio::test]
    async fn hit_sets_cached_flag_and_counts() {
        let cache = MemoryCache::new(4, Duration::from_secs(60));
        let k = key("q");
        assert!(cache.get(&k).await.unwrap().is_none());
        cache.put(&k, &response("a")).await.unwrap();

        let hit = cache.get(&k).await.unwrap().unwrap();
        assert!(hit.cached);
        assert_eq!(hit.content, "a");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.insertions, 1);
    }

    #[tokio::test]
    async fn capacity_bound_evicts_least_recently_used() {
        let cache = MemoryCache::new(2, Duration::from_secs(60));
        let (k1, k2, k3) = (key("one"), key("two"), key("three"));
        cache.put(&k1, &response("1")).await.unwrap();
        cache.put(&k2, &response("2")).await.unwrap();

        // Touch k1 so k2 becomes the LRU victim.
        assert!(cache.get(&k1).await.unwrap().is_some());
        cache.put(&k3, &response("3")).await.unwrap();

        assert_eq!(cache.len().await.unwrap(), 2);
        assert!(cache.get(&k2).await.unwrap().is_none());
        assert!(cache.get(&k1).await.unwrap().is_some());
        assert!(cache.get(&k3).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn expired_entry_is_absent_and_removed() {
        let cache = MemoryCache::new(4, Duration::from_millis(20));
        let k = key("q");
        cache.put(&k, &response("a")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(cache.get(&k).await.unwrap().is_none());
        assert_eq!(cache.len().await.unwrap(), 0);
        assert_eq!(cache.stats().expirations, 1);
    }

    #[tokio::test]
    async fn null_cache_stores_nothing() {
        let cache = NullCache::new();
        let k = key("q");
        cache.put(&k, &response("a")).await.unwrap();
        assert!(cache.get(&k).await.unwrap().is_none());
        assert_eq!(cache.len().await.unwrap(), 0);
    }
}
