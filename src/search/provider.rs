//! Search provider trait and error classification

use crate::retry::{RetryClass, Retryable};
use crate::session::Snippet;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from the external search service
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),
    #[error("rate limited by search provider")]
    RateLimited,
    #[error("search quota exhausted")]
    QuotaExceeded,
    #[error("authentication failed")]
    Auth,
    #[error("rejected query: {0}")]
    BadRequest(String),
    #[error("search API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("failed to parse search response: {0}")]
    Parse(String),
}

impl Retryable for ProviderError {
    fn retry_class(&self) -> RetryClass {
        match self {
            Self::Network(_) | Self::RateLimited | Self::QuotaExceeded => RetryClass::Transient,
            Self::Api { status, .. } if *status >= 500 => RetryClass::Transient,
            _ => RetryClass::Fatal,
        }
    }
}

/// External search backend
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Run one raw search call
    ///
    /// Returns snippets in provider ranking order, at most `max_results`.
    async fn raw_search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<Snippet>, ProviderError>;
}
