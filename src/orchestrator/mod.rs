//! Pipeline orchestration
//!
//! Drives the plan, search, reflect, synthesize, report loop as an explicit
//! state machine. Searches within a turn run concurrently behind a join
//! barrier; a single failed search marks its task failed without disturbing
//! siblings. Fatal errors surface as `PipelineError` tagged with the
//! originating component.

use crate::agents::{
    CitationMap, PlanError, Planner, ReflectError, Reflector, ReportError, ReportWriter,
    SynthesisError, Synthesizer,
};
use crate::metrics::Metrics;
use crate::search::{SearchClient, SearchError};
use crate::session::{Evidence, ResearchSession, SessionError, TaskStatus};
use futures::future::join_all;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// States of the research pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Planning,
    Searching,
    Reflecting,
    Synthesizing,
    ReportWriting,
    Done,
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Planning => "planning",
            Self::Searching => "searching",
            Self::Reflecting => "reflecting",
            Self::Synthesizing => "synthesizing",
            Self::ReportWriting => "report_writing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Fatal pipeline errors, tagged with the originating component
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("planner: {0}")]
    Planning(#[from] PlanError),
    #[error("search: {0}")]
    Search(#[from] SearchError),
    #[error("reflector: {0}")]
    Reflection(#[from] ReflectError),
    #[error("synthesizer: {0}")]
    Synthesis(#[from] SynthesisError),
    #[error("report writer: {0}")]
    Report(#[from] ReportError),
    #[error("session: {0}")]
    Session(#[from] SessionError),
}

impl PipelineError {
    /// Name of the component the failure originated in
    pub fn component(&self) -> &'static str {
        match self {
            Self::Planning(_) => "planner",
            Self::Search(_) => "search",
            Self::Reflection(_) => "reflector",
            Self::Synthesis(_) => "synthesizer",
            Self::Report(_) => "report writer",
            Self::Session(_) => "session",
        }
    }
}

/// Result of a completed research run
#[derive(Debug)]
pub struct ResearchOutcome {
    /// The final Markdown document
    pub report: String,
    /// The finalized session, for auditing
    pub session: ResearchSession,
}

/// Drives one research session from query to report
pub struct Orchestrator {
    planner: Planner,
    reflector: Reflector,
    synthesizer: Synthesizer,
    writer: ReportWriter,
    search: SearchClient,
    max_turns: u32,
    max_results: usize,
    deadline: Option<Duration>,
    metrics: Arc<Metrics>,
}

impl Orchestrator {
    pub fn new(
        planner: Planner,
        reflector: Reflector,
        synthesizer: Synthesizer,
        writer: ReportWriter,
        search: SearchClient,
    ) -> Self {
        Self {
            planner,
            reflector,
            synthesizer,
            writer,
            search,
            max_turns: crate::DEFAULT_MAX_TURNS,
            max_results: crate::DEFAULT_MAX_RESULTS,
            deadline: None,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Cap the number of search/reflect turns
    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    /// Results requested per search call
    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self
    }

    /// Wall-clock budget for the whole session
    ///
    /// Checked at the reflect gate: in-flight searches always complete, but
    /// once the budget is spent no new turn starts.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Record stage timings and call counts
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Run one research session to completion
    pub async fn run(&self, query: &str) -> Result<ResearchOutcome, PipelineError> {
        let run_started = Instant::now();
        let mut session = ResearchSession::new(query, self.max_turns);
        let mut stage = Stage::Planning;

        info!("starting research for '{}'", query);

        loop {
            match stage {
                Stage::Planning => {
                    let started = Instant::now();
                    let planned = self.planner.plan(query).await?;
                    self.record_stage(Stage::Planning, started);

                    let mut added = 0;
                    for task in planned {
                        if session.add_task(task).is_some() {
                            added += 1;
                        }
                    }
                    info!("plan ready with {} task(s)", added);
                    stage = Stage::Searching;
                }

                Stage::Searching => {
                    let started = Instant::now();
                    let batch = session.pending_tasks();
                    for (id, _) in &batch {
                        session.set_task_status(*id, TaskStatus::InProgress);
                    }
                    info!(
                        "turn {}/{}: searching {} task(s)",
                        session.turn(),
                        self.max_turns,
                        batch.len()
                    );

                    let search = &self.search;
                    let max_results = self.max_results;
                    let futures: Vec<_> = batch
                        .into_iter()
                        .map(|(id, question)| async move {
                            let result = search.search(&question, max_results).await;
                            (id, question, result)
                        })
                        .collect();

                    // Barrier: every search in the batch lands before reflection.
                    let outcomes = join_all(futures).await;
                    self.record_stage(Stage::Searching, started);

                    for (id, question, result) in outcomes {
                        match result {
                            Ok(snippets) => {
                                debug!("task {}: captured {} snippet(s)", id, snippets.len());
                                session.record_evidence(Evidence::new(id, question, snippets));
                                session.set_task_status(id, TaskStatus::Done);
                            }
                            Err(err @ SearchError::Unavailable { .. }) => {
                                warn!("task {} marked failed: {}", id, err);
                                session.set_task_status(id, TaskStatus::Failed);
                            }
                            Err(err) => {
                                error!("fatal search error on task {}: {}", id, err);
                                return Err(err.into());
                            }
                        }
                    }
                    stage = Stage::Reflecting;
                }

                Stage::Reflecting => {
                    let started = Instant::now();
                    let verdict = self.reflector.reflect(&session).await?;
                    self.record_stage(Stage::Reflecting, started);
                    debug!(
                        "verdict: sufficient={} ({})",
                        verdict.sufficient, verdict.rationale
                    );

                    if verdict.sufficient {
                        info!("evidence sufficient: {}", verdict.rationale);
                        stage = Stage::Synthesizing;
                    } else if session.turn_budget_reached() {
                        info!(
                            "turn budget of {} reached; forcing synthesis",
                            self.max_turns
                        );
                        stage = Stage::Synthesizing;
                    } else if self.deadline_passed(run_started) {
                        info!("session deadline reached; forcing synthesis");
                        stage = Stage::Synthesizing;
                    } else {
                        let fresh: Vec<&str> = verdict
                            .new_tasks
                            .iter()
                            .map(String::as_str)
                            .filter(|q| !session.is_duplicate_question(q))
                            .collect();
                        if fresh.is_empty() {
                            info!("insufficient but nothing new to search; forcing synthesis");
                            stage = Stage::Synthesizing;
                        } else {
                            session.next_turn();
                            let mut appended = 0;
                            for question in fresh {
                                if session.add_question(question).is_some() {
                                    appended += 1;
                                }
                            }
                            info!(
                                "appended {} task(s); entering turn {}",
                                appended,
                                session.turn()
                            );
                            stage = Stage::Searching;
                        }
                    }
                }

                Stage::Synthesizing => {
                    let started = Instant::now();
                    let findings = self.synthesizer.synthesize(&session).await?;
                    session.add_findings(findings)?;
                    self.record_stage(Stage::Synthesizing, started);
                    info!("synthesized {} finding(s)", session.findings().len());
                    stage = Stage::ReportWriting;
                }

                Stage::ReportWriting => {
                    let started = Instant::now();
                    let citations = CitationMap::from_evidence(session.evidence());
                    let report = self
                        .writer
                        .write(&session.query, session.findings(), &citations)
                        .await?;
                    self.record_stage(Stage::ReportWriting, started);
                    info!(
                        "report complete with {} source(s) after {:?}",
                        citations.sources().len(),
                        run_started.elapsed()
                    );
                    return Ok(ResearchOutcome { report, session });
                }

                // Done is only reached by returning above; Failed is the
                // error return path.
                Stage::Done | Stage::Failed => unreachable!("terminal stage inside loop"),
            }
        }
    }

    fn deadline_passed(&self, run_started: Instant) -> bool {
        self.deadline
            .map(|d| run_started.elapsed() >= d)
            .unwrap_or(false)
    }

    fn record_stage(&self, stage: Stage, started: Instant) {
        self.metrics
            .record_stage_time(&stage.to_string(), started.elapsed().as_millis() as u64);
    }
}
