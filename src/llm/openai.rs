//! OpenAI-compatible chat completions client
//!
//! Works against any backend exposing the `/chat/completions` shape,
//! including Gemini's OpenAI-compatible endpoint. Transient failures are
//! retried in-client with bounded backoff.

use super::{CompletionClient, CompletionRequest, LlmError};
use crate::config::LlmSettings;
use crate::metrics::Metrics;
use crate::retry::{self, BackoffPolicy};
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// HTTP client for one model on an OpenAI-compatible backend
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: Option<f32>,
    policy: BackoffPolicy,
    metrics: Option<Arc<Metrics>>,
}

impl OpenAiCompatClient {
    /// Create a client for `model` from LLM settings
    pub fn with_settings(settings: &LlmSettings, model: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs_f64(settings.request_timeout))
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: model.into(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            policy: BackoffPolicy::default(),
            metrics: None,
        })
    }

    /// Set the retry policy for transient failures
    pub fn with_policy(mut self, policy: BackoffPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Record per-call metrics
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    async fn send(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        if let Some(metrics) = &self.metrics {
            metrics.record_llm_call();
        }

        let mut messages = Vec::new();
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        let body = ChatRequest {
            model: self.model.as_str(),
            messages,
            temperature: request.temperature.or(self.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status {
                429 => LlmError::RateLimited,
                401 | 403 => LlmError::Auth,
                _ => LlmError::Api { status, message },
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(LlmError::Empty);
        }

        debug!("completion from {} ({} chars)", self.model, content.len());
        Ok(content)
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let request = &request;
        retry::retry(&self.policy, "completion", move || self.send(request)).await
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(server: &MockServer) -> LlmSettings {
        LlmSettings {
            base_url: server.uri(),
            api_key: "test-key".to_string(),
            ..Default::default()
        }
    }

    fn quick_policy() -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(1),
            factor: 2.0,
            max_delay: Duration::from_millis(4),
            max_attempts: 3,
        }
    }

    fn completion_json(content: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
    }

    #[tokio::test]
    async fn test_successful_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_json("hello")))
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::with_settings(&settings_for(&server), "test-model")
            .unwrap()
            .with_policy(quick_policy());
        let text = client
            .complete(CompletionRequest::new("hi"))
            .await
            .unwrap();
        assert_eq!(text, "hello");
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_json("recovered")))
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::with_settings(&settings_for(&server), "test-model")
            .unwrap()
            .with_policy(quick_policy());
        let text = client
            .complete(CompletionRequest::new("hi"))
            .await
            .unwrap();
        assert_eq!(text, "recovered");
    }

    #[tokio::test]
    async fn test_auth_failure_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::with_settings(&settings_for(&server), "test-model")
            .unwrap()
            .with_policy(quick_policy());
        let err = client
            .complete(CompletionRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Auth));
    }

    #[tokio::test]
    async fn test_empty_content_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_json("  ")))
            .mount(&server)
            .await;

        let client = OpenAiCompatClient::with_settings(&settings_for(&server), "test-model")
            .unwrap()
            .with_policy(quick_policy());
        let err = client
            .complete(CompletionRequest::new("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Empty));
    }
}
