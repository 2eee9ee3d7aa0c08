//! LLM completion interface
//!
//! The pipeline stages talk to the model through the `CompletionClient`
//! trait; `OpenAiCompatClient` is the single HTTP implementation, pointed at
//! any OpenAI-compatible chat-completions backend.

mod openai;

pub use openai::OpenAiCompatClient;

use crate::retry::{RetryClass, Retryable};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the completion backend
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),
    #[error("completion API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("rate limited by completion API")]
    RateLimited,
    #[error("authentication failed")]
    Auth,
    #[error("failed to parse completion response: {0}")]
    Parse(String),
    #[error("empty completion response")]
    Empty,
}

impl Retryable for LlmError {
    fn retry_class(&self) -> RetryClass {
        match self {
            Self::Network(_) | Self::RateLimited => RetryClass::Transient,
            Self::Api { status, .. } if *status >= 500 => RetryClass::Transient,
            _ => RetryClass::Fatal,
        }
    }
}

/// One completion request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// System instructions for the stage
    pub system: Option<String>,
    /// The user prompt
    pub prompt: String,
    /// Sampling temperature override
    pub temperature: Option<f32>,
    /// Completion token budget override
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Prompt-to-text completion backend
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Model identifier this client completes with
    fn model(&self) -> &str;

    /// Run one completion and return the response text
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}

/// Strip the Markdown code fence models often wrap JSON in
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim();
        }
    }
    trimmed
}

/// Parse a completion as schema-validated JSON
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let cleaned = strip_code_fences(text);
    serde_json::from_str(cleaned).map_err(|e| LlmError::Parse(e.to_string()))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Client that replays a fixed queue of responses
    pub struct ScriptedClient {
        responses: Mutex<VecDeque<String>>,
    }

    impl ScriptedClient {
        pub fn new<S: Into<String>>(responses: Vec<S>) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        fn model(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<String, LlmError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(LlmError::Empty)
        }
    }

    /// Client that returns the same response every call
    pub struct FixedClient(pub String);

    #[async_trait]
    impl CompletionClient for FixedClient {
        fn model(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<String, LlmError> {
            Ok(self.0.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Probe {
        value: u32,
    }

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_parse_json_response() {
        let probe: Probe = parse_json_response("```json\n{\"value\": 7}\n```").unwrap();
        assert_eq!(probe.value, 7);

        let err = parse_json_response::<Probe>("not json").unwrap_err();
        assert!(matches!(err, LlmError::Parse(_)));
    }

    #[test]
    fn test_retry_classification() {
        assert!(LlmError::RateLimited.is_transient());
        assert!(LlmError::Network("reset".into()).is_transient());
        assert!(LlmError::Api {
            status: 503,
            message: "overloaded".into()
        }
        .is_transient());
        assert!(!LlmError::Auth.is_transient());
        assert!(!LlmError::Parse("bad".into()).is_transient());
        assert!(!LlmError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_transient());
    }

    #[test]
    fn test_request_builder() {
        let request = CompletionRequest::new("prompt")
            .with_system("system")
            .with_temperature(0.2)
            .with_max_tokens(256);
        assert_eq!(request.system.as_deref(), Some("system"));
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(256));
    }
}
