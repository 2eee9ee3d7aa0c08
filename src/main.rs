//! DeepResearch-RS: an autonomous deep-research pipeline written in Rust
//!
//! This is the main entry point for the application.

use anyhow::Result;
use deepresearch_rs::{
    agents::{Planner, Reflector, ReportWriter, Synthesizer},
    cache::SearchCache,
    config::Settings,
    limiter::RateLimiter,
    llm::{CompletionClient, OpenAiCompatClient},
    metrics::Metrics,
    search::{SearchClient, Tavily},
    Orchestrator,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first so debug mode can raise the log level
    let settings = load_settings()?;

    FmtSubscriber::builder()
        .with_max_level(if settings.general.debug {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_target(false)
        .init();

    let query = match std::env::args().nth(1) {
        Some(query) => query,
        None => {
            print_usage();
            std::process::exit(2);
        }
    };

    info!("Starting DeepResearch-RS v{}", deepresearch_rs::VERSION);
    info!("Instance: {}", settings.general.instance_name);

    let metrics = Arc::new(Metrics::new());
    let policy = settings.backoff.policy();

    // One client per model tier
    let planner_llm = Arc::new(
        OpenAiCompatClient::with_settings(&settings.llm, settings.llm.planner_model.clone())?
            .with_policy(policy.clone())
            .with_metrics(Arc::clone(&metrics)),
    );
    let light_llm: Arc<dyn CompletionClient> = Arc::new(
        OpenAiCompatClient::with_settings(&settings.llm, settings.llm.light_model.clone())?
            .with_policy(policy.clone())
            .with_metrics(Arc::clone(&metrics)),
    );
    let writer_llm = Arc::new(
        OpenAiCompatClient::with_settings(&settings.llm, settings.llm.model.clone())?
            .with_policy(policy.clone())
            .with_metrics(Arc::clone(&metrics)),
    );

    let limiter = Arc::new(RateLimiter::new(
        settings.rate_limit.quota,
        settings.rate_limit.window(),
    ));
    let provider = Arc::new(Tavily::with_settings(&settings.search)?);
    let mut search = SearchClient::new(provider, limiter)
        .with_policy(policy)
        .with_metrics(Arc::clone(&metrics));
    if settings.cache.enabled {
        search = search.with_cache(Arc::new(SearchCache::with_settings(&settings.cache)));
    }
    info!("search client ready ({} calls per {:?})", settings.rate_limit.quota, settings.rate_limit.window());

    let mut orchestrator = Orchestrator::new(
        Planner::new(planner_llm).with_max_tasks(settings.research.max_plan_tasks),
        Reflector::new(Arc::clone(&light_llm))
            .with_max_new_tasks(settings.research.max_followup_tasks),
        Synthesizer::new(light_llm),
        ReportWriter::new(writer_llm),
        search,
    )
    .with_max_turns(settings.research.max_turns)
    .with_max_results(settings.research.max_results_per_search)
    .with_metrics(Arc::clone(&metrics));
    if let Some(secs) = settings.research.max_duration_secs {
        orchestrator = orchestrator.with_deadline(Duration::from_secs(secs));
    }

    let outcome = match orchestrator.run(&query).await {
        Ok(outcome) => outcome,
        Err(err) => {
            anyhow::bail!("research failed in {}: {}", err.component(), err);
        }
    };

    std::fs::write(&settings.output.report_path, &outcome.report)?;
    info!("Report saved to: {}", settings.output.report_path);
    info!(
        "Session: {} task(s), {} evidence entries, {} finding(s), {} search call(s), {} completion call(s)",
        outcome.session.tasks().len(),
        outcome.session.evidence().len(),
        outcome.session.findings().len(),
        metrics.search_attempts(),
        metrics.llm_calls()
    );

    println!("{}", outcome.report);

    Ok(())
}

/// Load settings from file or use defaults
fn load_settings() -> Result<Settings> {
    let paths = [
        PathBuf::from("research.yml"),
        PathBuf::from("config/research.yml"),
        dirs::config_dir()
            .map(|p| p.join("deepresearch-rs/research.yml"))
            .unwrap_or_default(),
    ];

    // Check environment variable first
    if let Ok(path) = std::env::var("DEEPRESEARCH_SETTINGS_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            let mut settings = Settings::from_file(&path)?;
            settings.merge_env();
            return Ok(settings);
        }
    }

    for path in paths.iter() {
        if path.exists() {
            let mut settings = Settings::from_file(path)?;
            settings.merge_env();
            return Ok(settings);
        }
    }

    // Use defaults
    let mut settings = Settings::default();
    settings.merge_env();
    Ok(settings)
}

/// Print usage information
fn print_usage() {
    println!(
        r#"
DeepResearch-RS v{}
An autonomous deep-research pipeline written in Rust

USAGE:
    deepresearch "<research query>"

ENVIRONMENT VARIABLES:
    DEEPRESEARCH_SETTINGS_PATH  Path to research.yml
    DEEPRESEARCH_DEBUG          Enable debug logging (true/false)
    DEEPRESEARCH_MAX_TURNS      Override the turn budget
    DEEPRESEARCH_REPORT_PATH    Where to write the report
    GEMINI_API_KEY              Completion backend API key
    TAVILY_API_KEY              Search provider API key
"#,
        deepresearch_rs::VERSION
    );
}
