//! Core data types for a research session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a research task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an evidence entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceId(Uuid);

impl EvidenceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EvidenceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EvidenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a research task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl TaskStatus {
    /// Whether the task has finished (successfully or not)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// A single sub-question to research
///
/// Tasks are created by the planner or the reflector and only ever
/// transition status; they are never removed from the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchTask {
    /// Task identifier
    pub id: TaskId,
    /// The sub-question to answer
    pub question: String,
    /// Current lifecycle state
    pub status: TaskStatus,
    /// Turn on which the task was created
    pub turn: u32,
}

impl ResearchTask {
    /// Create a new pending task
    pub fn new(question: impl Into<String>, turn: u32) -> Self {
        Self {
            id: TaskId::new(),
            question: question.into(),
            status: TaskStatus::Pending,
            turn,
        }
    }
}

/// Normalize a question for duplicate comparison
///
/// Case-folded with runs of whitespace collapsed to single spaces.
pub fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A single captured search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    /// Source URL
    pub url: String,
    /// Result title
    pub title: String,
    /// Content excerpt
    pub excerpt: String,
}

impl Snippet {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        excerpt: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            excerpt: excerpt.into(),
        }
    }
}

/// Raw results captured by one search call, immutable once recorded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    /// Evidence identifier
    pub id: EvidenceId,
    /// Task this evidence was gathered for
    pub task_id: TaskId,
    /// The query that was sent to the search provider
    pub query: String,
    /// Captured result snippets, in provider order
    pub snippets: Vec<Snippet>,
    /// When the search call completed
    pub fetched_at: DateTime<Utc>,
}

impl Evidence {
    pub fn new(task_id: TaskId, query: impl Into<String>, snippets: Vec<Snippet>) -> Self {
        Self {
            id: EvidenceId::new(),
            task_id,
            query: query.into(),
            snippets,
            fetched_at: Utc::now(),
        }
    }

    /// Whether the search call returned no results
    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}

/// Confidence tag attached to a synthesized finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Parse a model-supplied tag, defaulting to `Medium`
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::Medium
    }
}

/// An evidence-backed claim produced by the synthesizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// The synthesized claim
    pub claim: String,
    /// Evidence entries supporting the claim (never empty)
    pub evidence_ids: Vec<EvidenceId>,
    /// Confidence tag
    pub confidence: Confidence,
}

impl Finding {
    pub fn new(claim: impl Into<String>, evidence_ids: Vec<EvidenceId>) -> Self {
        Self {
            claim: claim.into(),
            evidence_ids,
            confidence: Confidence::default(),
        }
    }

    pub fn with_confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }
}

/// The reflector's decision for one loop iteration
///
/// Consumed by the orchestrator and not retained on the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionVerdict {
    /// Whether the gathered evidence is sufficient to stop searching
    pub sufficient: bool,
    /// Short explanation of the decision
    pub rationale: String,
    /// Supplementary questions to research next turn
    pub new_tasks: Vec<String>,
}

impl ReflectionVerdict {
    /// A verdict that ends the search loop
    pub fn sufficient(rationale: impl Into<String>) -> Self {
        Self {
            sufficient: true,
            rationale: rationale.into(),
            new_tasks: Vec::new(),
        }
    }

    /// A verdict that requests another turn
    pub fn insufficient(rationale: impl Into<String>, new_tasks: Vec<String>) -> Self {
        Self {
            sufficient: false,
            rationale: rationale.into(),
            new_tasks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_question() {
        assert_eq!(
            normalize_question("  What is   the X\tmarket size? "),
            "what is the x market size?"
        );
        assert_eq!(
            normalize_question("What is the X market size?"),
            normalize_question("what is the x MARKET size?")
        );
    }

    #[test]
    fn test_task_lifecycle() {
        let task = ResearchTask::new("How big is the market?", 1);
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(!task.status.is_terminal());
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
    }

    #[test]
    fn test_confidence_parse() {
        assert_eq!(Confidence::parse("High"), Confidence::High);
        assert_eq!(Confidence::parse(" low "), Confidence::Low);
        assert_eq!(Confidence::parse("unsure"), Confidence::Medium);
    }

    #[test]
    fn test_empty_evidence() {
        let ev = Evidence::new(TaskId::new(), "query", vec![]);
        assert!(ev.is_empty());
        let ev = Evidence::new(
            TaskId::new(),
            "query",
            vec![Snippet::new("https://a.example", "A", "text")],
        );
        assert!(!ev.is_empty());
    }
}
