//! Rate-limited, retrying search client

use super::provider::{ProviderError, SearchProvider};
use crate::cache::SearchCache;
use crate::limiter::RateLimiter;
use crate::metrics::Metrics;
use crate::retry::{self, BackoffPolicy, Retryable, RetryClass};
use crate::session::Snippet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Errors surfaced to the orchestrator by the search client
#[derive(Debug, Error)]
pub enum SearchError {
    /// Transient provider failures outlasted the retry budget
    #[error("search unavailable after {attempts} attempt(s): {source}")]
    Unavailable {
        attempts: u32,
        #[source]
        source: ProviderError,
    },
    /// Non-retryable provider failure (bad query, bad credentials)
    #[error("search configuration error: {0}")]
    Config(#[source] ProviderError),
}

/// Search front-end layering cache, rate limiting, and bounded retry
pub struct SearchClient {
    provider: Arc<dyn SearchProvider>,
    limiter: Arc<RateLimiter>,
    cache: Option<Arc<SearchCache>>,
    policy: BackoffPolicy,
    metrics: Arc<Metrics>,
}

impl SearchClient {
    /// Create a client over a provider and a shared rate limiter
    pub fn new(provider: Arc<dyn SearchProvider>, limiter: Arc<RateLimiter>) -> Self {
        Self {
            provider,
            limiter,
            cache: None,
            policy: BackoffPolicy::default(),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Serve repeated queries from a cache
    pub fn with_cache(mut self, cache: Arc<SearchCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the retry policy for transient failures
    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Record per-call metrics
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Run one search, in provider ranking order
    ///
    /// Every outbound attempt first waits on the shared rate limiter; cache
    /// hits bypass both the provider and the limiter.
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<Snippet>, SearchError> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(query, max_results).await {
                debug!("cache hit for '{}'", query);
                self.metrics.record_cache_hit();
                return Ok(hit);
            }
        }

        self.metrics.record_search();

        let outcome = retry::retry(&self.policy, "web search", move || async move {
            self.limiter.acquire().await;
            self.metrics.record_search_attempt();
            self.provider.raw_search(query, max_results).await
        })
        .await;

        match outcome {
            Ok(snippets) => {
                if let Some(cache) = &self.cache {
                    cache.put(query, max_results, snippets.clone()).await;
                }
                Ok(snippets)
            }
            Err(err) => {
                self.metrics.record_search_failure();
                match err.retry_class() {
                    RetryClass::Transient => Err(SearchError::Unavailable {
                        attempts: self.policy.max_attempts,
                        source: err,
                    }),
                    RetryClass::Fatal => Err(SearchError::Config(err)),
                }
            }
        }
    }
}
