//! Research planning stage

use crate::llm::{parse_json_response, CompletionClient, CompletionRequest, LlmError};
use crate::session::{normalize_question, ResearchTask};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are a research planning assistant. Plan the research \
     process step by step using scientific methods.";

/// Errors from the planning stage
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("planning completion failed: {0}")]
    Completion(#[from] LlmError),
    #[error("planner returned an invalid plan: {0}")]
    Invalid(String),
    #[error("planner produced no usable tasks")]
    Empty,
}

#[derive(Debug, Deserialize)]
struct PlanSchema {
    tasks: Vec<PlannedTask>,
}

#[derive(Debug, Deserialize)]
struct PlannedTask {
    question: String,
}

/// Decomposes a research query into distinct sub-questions
pub struct Planner {
    llm: Arc<dyn CompletionClient>,
    max_tasks: usize,
}

impl Planner {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self { llm, max_tasks: 5 }
    }

    /// Cap the number of sub-questions accepted from one plan
    pub fn with_max_tasks(mut self, max_tasks: usize) -> Self {
        self.max_tasks = max_tasks.max(1);
        self
    }

    /// Plan the research for a query
    ///
    /// The model response is validated against the expected JSON schema;
    /// duplicate questions are collapsed and the task count capped. A plan
    /// with no usable task is an error.
    pub async fn plan(&self, query: &str) -> Result<Vec<ResearchTask>, PlanError> {
        let prompt = format!(
            "Break the research query below into at most {} distinct, non-overlapping \
             sub-questions that together cover its facets.\n\n\
             Query: {}\n\n\
             Respond with JSON only, in the form \
             {{\"tasks\": [{{\"question\": \"...\"}}]}}.",
            self.max_tasks, query
        );

        let response = self
            .llm
            .complete(CompletionRequest::new(prompt).with_system(SYSTEM_PROMPT))
            .await?;

        let plan: PlanSchema =
            parse_json_response(&response).map_err(|e| PlanError::Invalid(e.to_string()))?;

        let mut seen = HashSet::new();
        let mut tasks = Vec::new();
        for planned in plan.tasks {
            let question = planned.question.trim();
            if question.is_empty() {
                continue;
            }
            if !seen.insert(normalize_question(question)) {
                continue;
            }
            tasks.push(ResearchTask::new(question, 1));
            if tasks.len() == self.max_tasks {
                break;
            }
        }

        if tasks.is_empty() {
            return Err(PlanError::Empty);
        }

        debug!("planned {} task(s) for '{}'", tasks.len(), query);
        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::test_support::ScriptedClient;

    fn planner_with(response: &str) -> Planner {
        Planner::new(Arc::new(ScriptedClient::new(vec![response])))
    }

    #[tokio::test]
    async fn test_valid_plan() {
        let planner = planner_with(
            r#"{"tasks": [{"question": "X market size"}, {"question": "Y market size"}]}"#,
        );
        let tasks = planner.plan("Compare X vs Y").await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].question, "X market size");
    }

    #[tokio::test]
    async fn test_duplicates_collapsed_and_capped() {
        let planner = planner_with(
            r#"{"tasks": [
                {"question": "X market size"},
                {"question": "  x MARKET size "},
                {"question": "Y market size"},
                {"question": "Z market size"}
            ]}"#,
        )
        .with_max_tasks(2);
        let tasks = planner.plan("Compare").await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].question, "Y market size");
    }

    #[tokio::test]
    async fn test_unparsable_plan_is_invalid() {
        let planner = planner_with("here is my plan: search for things");
        let err = planner.plan("q").await.unwrap_err();
        assert!(matches!(err, PlanError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_empty_plan_is_an_error() {
        let planner = planner_with(r#"{"tasks": [{"question": "   "}]}"#);
        let err = planner.plan("q").await.unwrap_err();
        assert!(matches!(err, PlanError::Empty));
    }

    #[tokio::test]
    async fn test_fenced_json_is_accepted() {
        let planner =
            planner_with("```json\n{\"tasks\": [{\"question\": \"X market size\"}]}\n```");
        let tasks = planner.plan("q").await.unwrap();
        assert_eq!(tasks.len(), 1);
    }
}
