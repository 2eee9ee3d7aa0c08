//! DeepResearch-RS: an autonomous deep-research pipeline written in Rust
//!
//! Plans a research query into sub-questions, searches the web for each
//! under a shared rate limit, iteratively reflects on evidence sufficiency,
//! and synthesizes an evidence-backed Markdown report with citations.

pub mod agents;
pub mod cache;
pub mod config;
pub mod limiter;
pub mod llm;
pub mod metrics;
pub mod orchestrator;
pub mod retry;
pub mod search;
pub mod session;

pub use config::Settings;
pub use limiter::RateLimiter;
pub use orchestrator::{Orchestrator, PipelineError, ResearchOutcome, Stage};
pub use search::{SearchClient, SearchError};
pub use session::{Evidence, Finding, ResearchSession, ResearchTask};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default maximum number of search/reflect turns
pub const DEFAULT_MAX_TURNS: u32 = 5;

/// Default results requested per search call
pub const DEFAULT_MAX_RESULTS: usize = 5;
