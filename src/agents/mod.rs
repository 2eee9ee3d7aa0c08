//! LLM-backed pipeline stages
//!
//! Each stage is a thin, validated adapter over the completion interface.
//! The contracts are what matter: schema validation, duplicate suppression,
//! and provenance checks all happen here, not in the model.

mod planner;
mod reflector;
mod report;
mod synthesizer;

pub use planner::{PlanError, Planner};
pub use reflector::{ReflectError, Reflector};
pub use report::{CitationMap, CitationSource, ReportError, ReportWriter};
pub use synthesizer::{SynthesisError, Synthesizer};

use crate::session::{EvidenceId, ResearchSession};

/// Render non-empty evidence as an indexed digest for prompting
///
/// Returns the digest text and the evidence ids backing each `E<n>` label,
/// in label order. Empty evidence entries are skipped so the model can only
/// cite evidence that actually has sources.
pub(crate) fn evidence_digest(session: &ResearchSession) -> (String, Vec<EvidenceId>) {
    let mut digest = String::new();
    let mut index = Vec::new();

    for evidence in session.evidence().iter().filter(|e| !e.is_empty()) {
        index.push(evidence.id);
        digest.push_str(&format!("E{} (query: {})\n", index.len(), evidence.query));
        for snippet in &evidence.snippets {
            digest.push_str(&format!(
                "  - {} ({}): {}\n",
                snippet.title,
                snippet.url,
                truncate(&snippet.excerpt, 300)
            ));
        }
    }

    (digest, index)
}

/// Character-safe excerpt truncation
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Evidence, Snippet};

    #[test]
    fn test_digest_skips_empty_evidence() {
        let mut session = ResearchSession::new("q", 1);
        let a = session.add_question("covered").unwrap();
        let b = session.add_question("empty").unwrap();

        session.record_evidence(Evidence::new(
            a,
            "covered",
            vec![Snippet::new("https://a.example", "A", "alpha")],
        ));
        session.record_evidence(Evidence::new(b, "empty", vec![]));

        let (digest, index) = evidence_digest(&session);
        assert_eq!(index.len(), 1);
        assert!(digest.contains("E1 (query: covered)"));
        assert!(digest.contains("https://a.example"));
        assert!(!digest.contains("E2"));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
        // Multi-byte characters must not be split.
        assert_eq!(truncate("ééééé", 2), "éé...");
    }
}
