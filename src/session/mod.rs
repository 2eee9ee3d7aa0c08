//! Research session aggregate
//!
//! The session is the single owner of the task list, the evidence set, the
//! findings, and the turn counter. Components read from it; only the
//! orchestrator mutates it.

mod types;

pub use types::*;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by session-level invariant checks
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("finding \"{claim}\" cites evidence {id} that is not in the session")]
    DanglingEvidence { claim: String, id: EvidenceId },
}

/// Aggregate root for one research run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSession {
    /// The original research query
    pub query: String,
    tasks: Vec<ResearchTask>,
    evidence: Vec<Evidence>,
    findings: Vec<Finding>,
    turn: u32,
    max_turns: u32,
}

impl ResearchSession {
    /// Create a session for a query with a turn budget
    pub fn new(query: impl Into<String>, max_turns: u32) -> Self {
        Self {
            query: query.into(),
            tasks: Vec::new(),
            evidence: Vec::new(),
            findings: Vec::new(),
            turn: 1,
            max_turns: max_turns.max(1),
        }
    }

    /// Current turn, starting at 1
    pub fn turn(&self) -> u32 {
        self.turn
    }

    /// Configured turn budget
    pub fn max_turns(&self) -> u32 {
        self.max_turns
    }

    /// Advance to the next turn
    pub fn next_turn(&mut self) {
        self.turn += 1;
    }

    /// Whether the turn budget has been used up
    pub fn turn_budget_reached(&self) -> bool {
        self.turn >= self.max_turns
    }

    /// All tasks, in creation order
    pub fn tasks(&self) -> &[ResearchTask] {
        &self.tasks
    }

    /// All recorded evidence, in arrival order
    pub fn evidence(&self) -> &[Evidence] {
        &self.evidence
    }

    /// All accepted findings
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// Add a planner-created task, rejecting duplicates
    ///
    /// Returns the task id, or `None` when a non-failed task already asks the
    /// same (normalized) question.
    pub fn add_task(&mut self, task: ResearchTask) -> Option<TaskId> {
        if self.is_duplicate_question(&task.question) {
            return None;
        }
        let id = task.id;
        self.tasks.push(task);
        Some(id)
    }

    /// Add a new pending task for a question on the current turn
    pub fn add_question(&mut self, question: &str) -> Option<TaskId> {
        self.add_task(ResearchTask::new(question, self.turn))
    }

    /// Whether a non-failed task already asks this question
    ///
    /// Failed tasks do not count: re-asking a failed question is how failed
    /// searches get retried.
    pub fn is_duplicate_question(&self, question: &str) -> bool {
        let key = normalize_question(question);
        self.tasks
            .iter()
            .filter(|t| t.status != TaskStatus::Failed)
            .any(|t| normalize_question(&t.question) == key)
    }

    /// Look up a task by id
    pub fn task(&self, id: TaskId) -> Option<&ResearchTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Transition a task's status
    pub fn set_task_status(&mut self, id: TaskId, status: TaskStatus) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            task.status = status;
        }
    }

    /// Ids and questions of all pending tasks
    pub fn pending_tasks(&self) -> Vec<(TaskId, String)> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .map(|t| (t.id, t.question.clone()))
            .collect()
    }

    /// Tasks that have terminally failed
    pub fn failed_tasks(&self) -> Vec<&ResearchTask> {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .collect()
    }

    /// Record evidence captured for a task
    pub fn record_evidence(&mut self, evidence: Evidence) {
        self.evidence.push(evidence);
    }

    /// Look up evidence by id
    pub fn evidence_by_id(&self, id: EvidenceId) -> Option<&Evidence> {
        self.evidence.iter().find(|e| e.id == id)
    }

    /// Whether any evidence has been recorded for a task
    pub fn has_evidence_for(&self, task_id: TaskId) -> bool {
        self.evidence.iter().any(|e| e.task_id == task_id)
    }

    /// Tasks with no associated evidence
    pub fn uncovered_tasks(&self) -> Vec<&ResearchTask> {
        self.tasks
            .iter()
            .filter(|t| !self.has_evidence_for(t.id))
            .collect()
    }

    /// Accept synthesized findings, enforcing citation integrity
    ///
    /// Every supporting evidence id must reference evidence present in the
    /// session; the first dangling reference rejects the whole batch.
    pub fn add_findings(&mut self, findings: Vec<Finding>) -> Result<(), SessionError> {
        for finding in &findings {
            for id in &finding.evidence_ids {
                if self.evidence_by_id(*id).is_none() {
                    return Err(SessionError::DanglingEvidence {
                        claim: finding.claim.clone(),
                        id: *id,
                    });
                }
            }
        }
        self.findings.extend(findings);
        Ok(())
    }
}
