//! Tavily search provider

use super::provider::{ProviderError, SearchProvider};
use crate::config::SearchSettings;
use crate::session::Snippet;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Client for the Tavily search API
pub struct Tavily {
    client: Client,
    base_url: String,
    api_key: String,
}

impl Tavily {
    /// Create a provider from search settings
    pub fn with_settings(settings: &SearchSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs_f64(settings.request_timeout))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait]
impl SearchProvider for Tavily {
    fn name(&self) -> &str {
        "tavily"
    }

    async fn raw_search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<Snippet>, ProviderError> {
        if query.trim().is_empty() {
            return Err(ProviderError::BadRequest("empty query".to_string()));
        }

        let body = TavilyRequest { query, max_results };

        let response = self
            .client
            .post(format!("{}/search", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status {
                429 => ProviderError::RateLimited,
                432 => ProviderError::QuotaExceeded,
                401 | 403 => ProviderError::Auth,
                400 | 422 => ProviderError::BadRequest(message),
                _ => ProviderError::Api { status, message },
            });
        }

        let parsed: TavilyResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let snippets: Vec<Snippet> = parsed
            .results
            .into_iter()
            .take(max_results)
            .map(|r| {
                let excerpt = r.snippet.or(r.content).unwrap_or_default();
                Snippet::new(r.url, r.title.unwrap_or_default(), excerpt)
            })
            .collect();

        debug!("tavily returned {} result(s) for '{}'", snippets.len(), query);
        Ok(snippets)
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    url: String,
    title: Option<String>,
    content: Option<String>,
    snippet: Option<String>,
}
