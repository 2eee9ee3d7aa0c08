//! Evidence synthesis stage

use super::evidence_digest;
use crate::llm::{parse_json_response, CompletionClient, CompletionRequest, LlmError};
use crate::session::{Confidence, EvidenceId, Finding, ResearchSession};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "Your job is to review all research notes and sources, \
     merge overlapping findings, resolve contradictions, and create a clear, \
     structured summary.\n\
     - Group insights into categories\n\
     - Remove duplicates\n\
     - Flag uncertainties\n\
     - Keep track of citations\n\
     Return a clean knowledge base for the report writer.";

/// Word-overlap ratio above which two claims count as the same
const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Errors from the synthesis stage
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("synthesis completion failed: {0}")]
    Completion(#[from] LlmError),
    #[error("synthesizer returned invalid findings: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
struct FindingsSchema {
    findings: Vec<RawFinding>,
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    claim: String,
    #[serde(default)]
    evidence: Vec<String>,
    #[serde(default)]
    confidence: Option<String>,
}

/// Merges raw evidence into deduplicated, attributed findings
pub struct Synthesizer {
    llm: Arc<dyn CompletionClient>,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self { llm }
    }

    /// Synthesize findings from the session's evidence
    ///
    /// Every emitted finding carries at least one resolvable evidence id;
    /// claims the model fails to attribute are dropped. Near-duplicate
    /// claims are merged with their evidence ids unioned.
    pub async fn synthesize(
        &self,
        session: &ResearchSession,
    ) -> Result<Vec<Finding>, SynthesisError> {
        let (digest, index) = evidence_digest(session);
        if index.is_empty() {
            debug!("no non-empty evidence to synthesize");
            return Ok(Vec::new());
        }

        let prompt = format!(
            "Research query: {}\n\n\
             Evidence entries, each labeled E<n>:\n{}\n\
             Derive the key findings supported by this evidence. Attribute \
             each finding to the evidence labels that back it.\n\n\
             Respond with JSON only, in the form \
             {{\"findings\": [{{\"claim\": \"...\", \"evidence\": [\"E1\"], \
             \"confidence\": \"high|medium|low\"}}]}}. \
             Use only the E labels listed above.",
            session.query, digest
        );

        let response = self
            .llm
            .complete(CompletionRequest::new(prompt).with_system(SYSTEM_PROMPT))
            .await?;

        let schema: FindingsSchema =
            parse_json_response(&response).map_err(|e| SynthesisError::Invalid(e.to_string()))?;

        let mut findings: Vec<Finding> = Vec::new();
        for raw in schema.findings {
            let claim = raw.claim.trim();
            if claim.is_empty() {
                continue;
            }

            let mut ids = Vec::new();
            for label in &raw.evidence {
                if let Some(id) = resolve_label(label, &index) {
                    if !ids.contains(&id) {
                        ids.push(id);
                    }
                }
            }
            if ids.is_empty() {
                warn!("dropping claim without usable evidence: {}", claim);
                continue;
            }

            let confidence = raw
                .confidence
                .as_deref()
                .map(Confidence::parse)
                .unwrap_or_default();

            if let Some(existing) = findings.iter_mut().find(|f| claims_similar(&f.claim, claim)) {
                for id in ids {
                    if !existing.evidence_ids.contains(&id) {
                        existing.evidence_ids.push(id);
                    }
                }
            } else {
                findings.push(Finding::new(claim, ids).with_confidence(confidence));
            }
        }

        debug!("synthesized {} finding(s)", findings.len());
        Ok(findings)
    }
}

/// Resolve an evidence label ("E3", "e3", or "3") against the digest index
fn resolve_label(label: &str, index: &[EvidenceId]) -> Option<EvidenceId> {
    let digits = label.trim().trim_start_matches(['E', 'e']);
    let n: usize = digits.parse().ok()?;
    if n == 0 {
        return None;
    }
    index.get(n - 1).copied()
}

fn normalize_claim(text: &str) -> String {
    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Near-duplicate test: normalized equality or high word-set overlap
fn claims_similar(a: &str, b: &str) -> bool {
    let na = normalize_claim(a);
    let nb = normalize_claim(b);
    if na == nb {
        return true;
    }

    let wa: HashSet<&str> = na.split(' ').filter(|w| !w.is_empty()).collect();
    let wb: HashSet<&str> = nb.split(' ').filter(|w| !w.is_empty()).collect();
    let union = wa.union(&wb).count();
    if union == 0 {
        return false;
    }
    let intersection = wa.intersection(&wb).count();
    intersection as f64 / union as f64 >= SIMILARITY_THRESHOLD
}
