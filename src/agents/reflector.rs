//! Evidence sufficiency reflection stage

use super::evidence_digest;
use crate::llm::{parse_json_response, CompletionClient, CompletionRequest, LlmError};
use crate::session::{
    normalize_question, ReflectionVerdict, ResearchSession, TaskStatus,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are a helpful reflection assistant. Use reflective \
     listening to decide if the research goal is complete.";

/// Errors from the reflection stage
#[derive(Debug, Error)]
pub enum ReflectError {
    #[error("reflection completion failed: {0}")]
    Completion(#[from] LlmError),
    #[error("reflector returned an invalid verdict: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
struct ReflectionSchema {
    sufficient: bool,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    followup_questions: Vec<String>,
}

/// Decides whether the gathered evidence is sufficient
///
/// Coverage (every task has at least one evidence entry) is computed
/// locally; the model is consulted only once coverage is complete, to flag
/// contradictions and propose gap questions. This keeps verdicts cheap and
/// reproducible for a fixed backend.
pub struct Reflector {
    llm: Arc<dyn CompletionClient>,
    max_new_tasks: usize,
}

impl Reflector {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self {
            llm,
            max_new_tasks: 3,
        }
    }

    /// Cap the supplementary tasks emitted per reflection
    pub fn with_max_new_tasks(mut self, max_new_tasks: usize) -> Self {
        self.max_new_tasks = max_new_tasks;
        self
    }

    /// Evaluate the session and produce a verdict
    pub async fn reflect(
        &self,
        session: &ResearchSession,
    ) -> Result<ReflectionVerdict, ReflectError> {
        let uncovered = session.uncovered_tasks();
        if !uncovered.is_empty() {
            // Coverage gap: failed questions are re-asked, no model call.
            let mut seen = HashSet::new();
            let mut new_tasks = Vec::new();
            for task in &uncovered {
                if task.status != TaskStatus::Failed {
                    continue;
                }
                if session.is_duplicate_question(&task.question) {
                    continue;
                }
                if !seen.insert(normalize_question(&task.question)) {
                    continue;
                }
                new_tasks.push(task.question.clone());
                if new_tasks.len() == self.max_new_tasks {
                    break;
                }
            }
            return Ok(ReflectionVerdict::insufficient(
                format!("{} task(s) have no supporting evidence", uncovered.len()),
                new_tasks,
            ));
        }

        let (digest, _) = evidence_digest(session);
        let questions: String = session
            .tasks()
            .iter()
            .map(|t| format!("- {}\n", t.question))
            .collect();

        let prompt = format!(
            "Research query: {}\n\n\
             Sub-questions researched:\n{}\n\
             Evidence gathered:\n{}\n\
             Decide whether this evidence is sufficient to answer the query. \
             Mark it insufficient only if it leaves contradictions or clear gaps, \
             and in that case propose at most {} new sub-questions that would \
             close them.\n\n\
             Respond with JSON only, in the form \
             {{\"sufficient\": true, \"rationale\": \"...\", \
             \"followup_questions\": [\"...\"]}}.",
            session.query, questions, digest, self.max_new_tasks
        );

        let response = self
            .llm
            .complete(CompletionRequest::new(prompt).with_system(SYSTEM_PROMPT))
            .await?;

        let schema: ReflectionSchema =
            parse_json_response(&response).map_err(|e| ReflectError::Invalid(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut new_tasks = Vec::new();
        for question in schema.followup_questions {
            let question = question.trim();
            if question.is_empty() {
                continue;
            }
            if session.is_duplicate_question(question) {
                debug!("skipping already-asked follow-up: {}", question);
                continue;
            }
            if !seen.insert(normalize_question(question)) {
                continue;
            }
            new_tasks.push(question.to_string());
            if new_tasks.len() == self.max_new_tasks {
                break;
            }
        }

        let rationale = if schema.rationale.trim().is_empty() {
            "no rationale given".to_string()
        } else {
            schema.rationale
        };

        Ok(ReflectionVerdict {
            sufficient: schema.sufficient,
            rationale,
            new_tasks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_support::{FixedClient, ScriptedClient};
    use crate::session::{Evidence, Snippet};

    fn covered_session() -> ResearchSession {
        let mut session = ResearchSession::new("compare X vs Y", 5);
        let a = session.add_question("X market size").unwrap();
        session.set_task_status(a, TaskStatus::Done);
        session.record_evidence(Evidence::new(
            a,
            "X market size",
            vec![Snippet::new("https://a.example", "A", "alpha")],
        ));
        session
    }

    #[tokio::test]
    async fn test_coverage_gap_skips_the_model() {
        let mut session = ResearchSession::new("compare X vs Y", 5);
        let a = session.add_question("X market size").unwrap();
        session.set_task_status(a, TaskStatus::Failed);

        // An empty script would fail on any completion call.
        let reflector = Reflector::new(Arc::new(ScriptedClient::new(Vec::<String>::new())));
        let verdict = reflector.reflect(&session).await.unwrap();

        assert!(!verdict.sufficient);
        assert_eq!(verdict.new_tasks, vec!["X market size".to_string()]);
    }

    #[tokio::test]
    async fn test_sufficient_verdict() {
        let reflector = Reflector::new(Arc::new(FixedClient(
            r#"{"sufficient": true, "rationale": "all facets covered"}"#.to_string(),
        )));
        let verdict = reflector.reflect(&covered_session()).await.unwrap();
        assert!(verdict.sufficient);
        assert_eq!(verdict.rationale, "all facets covered");
        assert!(verdict.new_tasks.is_empty());
    }

    #[tokio::test]
    async fn test_followups_are_deduplicated_and_capped() {
        let reflector = Reflector::new(Arc::new(FixedClient(
            r#"{"sufficient": false, "rationale": "gaps remain", "followup_questions": [
                "X market size",
                "Y growth rate",
                " y GROWTH rate ",
                "Y pricing",
                "Y customers"
            ]}"#
            .to_string(),
        )))
        .with_max_new_tasks(2);

        let verdict = reflector.reflect(&covered_session()).await.unwrap();
        assert!(!verdict.sufficient);
        // "X market size" is already a session task, the case variant is a
        // duplicate of the first fresh question, and the cap keeps two.
        assert_eq!(
            verdict.new_tasks,
            vec!["Y growth rate".to_string(), "Y pricing".to_string()]
        );
    }

    #[tokio::test]
    async fn test_reflection_is_idempotent_on_unchanged_session() {
        let reflector = Reflector::new(Arc::new(FixedClient(
            r#"{"sufficient": false, "rationale": "one gap", "followup_questions": ["Y growth rate"]}"#
                .to_string(),
        )));
        let session = covered_session();

        let first = reflector.reflect(&session).await.unwrap();
        let second = reflector.reflect(&session).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_invalid_verdict() {
        let reflector = Reflector::new(Arc::new(FixedClient("maybe?".to_string())));
        let err = reflector.reflect(&covered_session()).await.unwrap_err();
        assert!(matches!(err, ReflectError::Invalid(_)));
    }
}
