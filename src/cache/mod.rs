//! Search response caching
//!
//! Re-asked queries are served from memory so they never consume rate-limit
//! quota or provider credits.

use crate::config::CacheSettings;
use crate::session::Snippet;
use moka::future::Cache;
use std::time::Duration;

/// Cache of search responses keyed by query and result budget
pub struct SearchCache {
    cache: Cache<String, Vec<Snippet>>,
}

impl SearchCache {
    /// Create a cache with the given TTL and capacity
    pub fn new(ttl_seconds: u64, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .time_to_live(Duration::from_secs(ttl_seconds))
            .max_capacity(max_capacity)
            .build();

        Self { cache }
    }

    /// Create a cache from settings
    pub fn with_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.ttl_seconds, settings.max_capacity)
    }

    /// Get cached snippets for a query
    pub async fn get(&self, query: &str, max_results: usize) -> Option<Vec<Snippet>> {
        self.cache.get(&Self::key(query, max_results)).await
    }

    /// Store snippets for a query
    pub async fn put(&self, query: &str, max_results: usize, snippets: Vec<Snippet>) {
        self.cache.insert(Self::key(query, max_results), snippets).await;
    }

    /// Number of cached entries
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cache key for a query
    fn key(query: &str, max_results: usize) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(query.trim().to_lowercase().as_bytes());
        hasher.update(max_results.to_string().as_bytes());

        format!("{:x}", hasher.finalize())
    }
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::with_settings(&CacheSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_round_trip() {
        let cache = SearchCache::new(60, 100);
        let snippets = vec![Snippet::new("https://a.example", "A", "text")];

        cache.put("x market size", 5, snippets.clone()).await;
        assert_eq!(cache.get("x market size", 5).await, Some(snippets));
    }

    #[tokio::test]
    async fn test_key_includes_result_budget() {
        let cache = SearchCache::new(60, 100);
        cache
            .put("x market size", 5, vec![Snippet::new("https://a.example", "A", "t")])
            .await;

        assert!(cache.get("x market size", 10).await.is_none());
        // Keys normalize case and surrounding whitespace.
        assert!(cache.get("  X Market Size ", 5).await.is_some());
    }
}
