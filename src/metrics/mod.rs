//! Metrics collection module
//!
//! Tracks search and completion call volume, retry pressure, and per-stage
//! wall times for one pipeline process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Pipeline metrics collector
pub struct Metrics {
    /// Logical search requests (cache hits excluded)
    searches: AtomicU64,
    /// Provider calls actually dispatched, including retries
    search_attempts: AtomicU64,
    /// Searches that exhausted their retry budget or failed fatally
    search_failures: AtomicU64,
    /// Searches served from the cache
    cache_hits: AtomicU64,
    /// Completion calls dispatched, including retries
    llm_calls: AtomicU64,
    /// Stage wall times in milliseconds (rolling)
    stage_times: RwLock<HashMap<String, Vec<u64>>>,
}

impl Metrics {
    /// Create a new metrics instance
    pub fn new() -> Self {
        Self {
            searches: AtomicU64::new(0),
            search_attempts: AtomicU64::new(0),
            search_failures: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            llm_calls: AtomicU64::new(0),
            stage_times: RwLock::new(HashMap::new()),
        }
    }

    /// Record a logical search request
    pub fn record_search(&self) {
        self.searches.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one dispatched provider call
    pub fn record_search_attempt(&self) {
        self.search_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a search that ultimately failed
    pub fn record_search_failure(&self) {
        self.search_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache hit
    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one dispatched completion call
    pub fn record_llm_call(&self) {
        self.llm_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a stage's wall time
    pub fn record_stage_time(&self, stage: &str, time_ms: u64) {
        let mut times = self.stage_times.write().unwrap();
        let entry = times.entry(stage.to_string()).or_insert_with(Vec::new);

        // Keep last 100 samples
        if entry.len() >= 100 {
            entry.remove(0);
        }
        entry.push(time_ms);
    }

    pub fn searches(&self) -> u64 {
        self.searches.load(Ordering::Relaxed)
    }

    pub fn search_attempts(&self) -> u64 {
        self.search_attempts.load(Ordering::Relaxed)
    }

    pub fn search_failures(&self) -> u64 {
        self.search_failures.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn llm_calls(&self) -> u64 {
        self.llm_calls.load(Ordering::Relaxed)
    }

    /// Average wall time for a stage
    pub fn avg_stage_time(&self, stage: &str) -> Option<u64> {
        let times = self.stage_times.read().unwrap();
        times.get(stage).and_then(|t| {
            if t.is_empty() {
                None
            } else {
                Some(t.iter().sum::<u64>() / t.len() as u64)
            }
        })
    }

    /// Percentage of logical searches that succeeded
    pub fn search_reliability(&self) -> f64 {
        let total = self.searches();
        if total == 0 {
            100.0
        } else {
            let ok = total.saturating_sub(self.search_failures());
            (ok as f64 / total as f64) * 100.0
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
