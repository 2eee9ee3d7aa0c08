//! Settings structures for the research pipeline

use crate::retry::BackoffPolicy;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Main settings structure, loadable from a YAML file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub research: ResearchSettings,
    pub rate_limit: RateLimitSettings,
    pub backoff: BackoffSettings,
    pub llm: LlmSettings,
    pub search: SearchSettings,
    pub cache: CacheSettings,
    pub output: OutputSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            general: GeneralSettings::default(),
            research: ResearchSettings::default(),
            rate_limit: RateLimitSettings::default(),
            backoff: BackoffSettings::default(),
            llm: LlmSettings::default(),
            search: SearchSettings::default(),
            cache: CacheSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_yaml::from_str(&content)?;
        Ok(settings)
    }

    /// Overlay environment variables
    ///
    /// `GEMINI_API_KEY` and `TAVILY_API_KEY` carry the provider credentials;
    /// `DEEPRESEARCH_*` variables override individual knobs.
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("DEEPRESEARCH_DEBUG") {
            self.general.debug = val.parse().unwrap_or(false);
        }
        if let Ok(val) = std::env::var("GEMINI_API_KEY") {
            self.llm.api_key = val;
        }
        if let Ok(val) = std::env::var("TAVILY_API_KEY") {
            self.search.api_key = val;
        }
        if let Ok(val) = std::env::var("DEEPRESEARCH_MAX_TURNS") {
            if let Ok(turns) = val.parse() {
                self.research.max_turns = turns;
            }
        }
        if let Ok(val) = std::env::var("DEEPRESEARCH_REPORT_PATH") {
            self.output.report_path = val;
        }
    }
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Enable debug mode
    pub debug: bool,
    /// Instance name used in log output
    pub instance_name: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            debug: false,
            instance_name: "DeepResearch".to_string(),
        }
    }
}

/// Research loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchSettings {
    /// Maximum search/reflect turns before synthesis is forced
    pub max_turns: u32,
    /// Maximum sub-questions accepted from one plan
    pub max_plan_tasks: usize,
    /// Maximum results requested per search call
    pub max_results_per_search: usize,
    /// Maximum supplementary tasks per reflection
    pub max_followup_tasks: usize,
    /// Optional wall-clock deadline for the whole session, in seconds
    pub max_duration_secs: Option<u64>,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            max_turns: 5,
            max_plan_tasks: 5,
            max_results_per_search: 5,
            max_followup_tasks: 3,
            max_duration_secs: None,
        }
    }
}

/// Search rate-limit settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Calls allowed per window
    pub quota: usize,
    /// Window length in seconds
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        // The search provider allows 10 calls per minute.
        Self {
            quota: 10,
            window_secs: 60,
        }
    }
}

impl RateLimitSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Retry backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    /// Delay before the first retry, in milliseconds
    pub base_delay_ms: u64,
    /// Multiplier applied per attempt
    pub factor: f64,
    /// Upper bound on any single delay, in milliseconds
    pub max_delay_ms: u64,
    /// Total attempts, including the first
    pub max_attempts: u32,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            factor: 2.0,
            max_delay_ms: 30_000,
            max_attempts: 4,
        }
    }
}

impl BackoffSettings {
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay: Duration::from_millis(self.base_delay_ms),
            factor: self.factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts.max(1),
        }
    }
}

/// LLM backend settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// OpenAI-compatible base URL
    pub base_url: String,
    /// API key (usually injected via `GEMINI_API_KEY`)
    pub api_key: String,
    /// Model for report writing
    pub model: String,
    /// Cheaper model for reflection and synthesis
    pub light_model: String,
    /// Strongest model, used for planning
    pub planner_model: String,
    /// Request timeout in seconds
    pub request_timeout: f64,
    /// Completion token budget per call
    pub max_tokens: u32,
    /// Sampling temperature (backend default when unset)
    pub temperature: Option<f32>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
            light_model: "gemini-2.5-flash-lite".to_string(),
            planner_model: "gemini-2.5-pro".to_string(),
            request_timeout: 120.0,
            max_tokens: 4096,
            temperature: None,
        }
    }
}

/// Search provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Provider base URL
    pub base_url: String,
    /// API key (usually injected via `TAVILY_API_KEY`)
    pub api_key: String,
    /// Request timeout in seconds
    pub request_timeout: f64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.tavily.com".to_string(),
            api_key: String::new(),
            request_timeout: 30.0,
        }
    }
}

/// Search result cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Whether search responses are cached at all
    pub enabled: bool,
    /// Entry time-to-live in seconds
    pub ttl_seconds: u64,
    /// Maximum cached entries
    pub max_capacity: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 600,
            max_capacity: 1024,
        }
    }
}

/// Report output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    /// Where the binary writes the final Markdown report
    pub report_path: String,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            report_path: "research_report.md".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.research.max_turns, 5);
        assert_eq!(settings.rate_limit.quota, 10);
        assert_eq!(settings.rate_limit.window_secs, 60);
        assert_eq!(settings.backoff.max_attempts, 4);
        assert!(!settings.general.debug);
    }

    #[test]
    fn test_partial_yaml_falls_back_to_defaults() {
        let yaml = r#"
research:
  max_turns: 2
rate_limit:
  quota: 3
"#;
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.research.max_turns, 2);
        assert_eq!(settings.rate_limit.quota, 3);
        // Untouched sections keep their defaults.
        assert_eq!(settings.research.max_results_per_search, 5);
        assert_eq!(settings.backoff.factor, 2.0);
    }

    #[test]
    fn test_env_overlay_wins() {
        std::env::set_var("DEEPRESEARCH_REPORT_PATH", "/tmp/overridden.md");
        let mut settings = Settings::default();
        settings.merge_env();
        assert_eq!(settings.output.report_path, "/tmp/overridden.md");
        std::env::remove_var("DEEPRESEARCH_REPORT_PATH");
    }

    #[test]
    fn test_backoff_policy_conversion() {
        let backoff = BackoffSettings {
            base_delay_ms: 100,
            factor: 3.0,
            max_delay_ms: 1000,
            max_attempts: 0,
        };
        let policy = backoff.policy();
        assert_eq!(policy.base_delay, Duration::from_millis(100));
        // Attempt count of zero is clamped to one.
        assert_eq!(policy.max_attempts, 1);
    }
}
