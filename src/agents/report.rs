//! Report writing stage

use crate::llm::{CompletionClient, CompletionRequest, LlmError};
use crate::session::{Evidence, EvidenceId, Finding};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are the Report Writer Agent. Using the structured \
     research findings, produce a professional research report.\n\
     - Add an executive summary\n\
     - Organize with clear sections & subheadings\n\
     - Insert citations inline using the provided [n] markers\n\
     - End with a conclusion\n\
     Write in a professional, academic style, suitable for clients or publication.";

static MARKER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").unwrap());

/// Errors from the report stage
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("report completion failed: {0}")]
    Completion(#[from] LlmError),
    #[error("citation mismatch: {0}")]
    CitationMismatch(String),
}

/// One numbered source in the report's citation list
#[derive(Debug, Clone)]
pub struct CitationSource {
    pub number: u32,
    pub url: String,
    pub title: String,
}

/// Evidence ids mapped to `[n]` citation markers
///
/// Numbers are assigned densely in first-use order over distinct source
/// URLs, so the trailing source list matches the inline markers exactly.
pub struct CitationMap {
    by_evidence: HashMap<EvidenceId, Vec<u32>>,
    sources: Vec<CitationSource>,
}

impl CitationMap {
    /// Build the map from recorded evidence
    pub fn from_evidence(evidence: &[Evidence]) -> Self {
        let mut by_url: HashMap<String, u32> = HashMap::new();
        let mut sources: Vec<CitationSource> = Vec::new();
        let mut by_evidence = HashMap::new();

        for entry in evidence {
            let mut numbers = Vec::new();
            for snippet in &entry.snippets {
                let number = match by_url.get(&snippet.url) {
                    Some(&n) => n,
                    None => {
                        let n = sources.len() as u32 + 1;
                        by_url.insert(snippet.url.clone(), n);
                        sources.push(CitationSource {
                            number: n,
                            url: snippet.url.clone(),
                            title: source_title(snippet),
                        });
                        n
                    }
                };
                if !numbers.contains(&number) {
                    numbers.push(number);
                }
            }
            by_evidence.insert(entry.id, numbers);
        }

        Self {
            by_evidence,
            sources,
        }
    }

    /// Markers for an evidence entry, if it is in the map
    pub fn markers_for(&self, id: EvidenceId) -> Option<&[u32]> {
        self.by_evidence.get(&id).map(|v| v.as_slice())
    }

    /// Whether a marker number resolves to a source
    pub fn contains_marker(&self, number: u32) -> bool {
        number >= 1 && (number as usize) <= self.sources.len()
    }

    /// All sources in marker order
    pub fn sources(&self) -> &[CitationSource] {
        &self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.by_evidence.is_empty()
    }
}

/// Title for a source entry, falling back to the URL's hostname
fn source_title(snippet: &crate::session::Snippet) -> String {
    if !snippet.title.trim().is_empty() {
        return snippet.title.clone();
    }
    url::Url::parse(&snippet.url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_default()
}

/// Renders findings and citations into the final Markdown document
pub struct ReportWriter {
    llm: Arc<dyn CompletionClient>,
}

impl ReportWriter {
    pub fn new(llm: Arc<dyn CompletionClient>) -> Self {
        Self { llm }
    }

    /// Write the report
    ///
    /// Every finding must cite evidence present in the citations map, and
    /// every `[n]` marker in the rendered body must resolve to a source;
    /// either violation is a `CitationMismatch`.
    pub async fn write(
        &self,
        query: &str,
        findings: &[Finding],
        citations: &CitationMap,
    ) -> Result<String, ReportError> {
        for finding in findings {
            for id in &finding.evidence_ids {
                if citations.markers_for(*id).is_none() {
                    return Err(ReportError::CitationMismatch(format!(
                        "finding \"{}\" cites evidence {} with no citation entry",
                        finding.claim, id
                    )));
                }
            }
        }

        if findings.is_empty() {
            debug!("no findings; writing a best-effort stub report");
            return Ok(format!(
                "# Research Report\n\n\
                 **Query:** {}\n\n\
                 No evidence-backed findings could be synthesized for this \
                 query. Try re-running with a larger turn budget or a \
                 rephrased query.\n",
                query
            ));
        }

        let mut notes = String::new();
        for finding in findings {
            let mut markers: Vec<u32> = finding
                .evidence_ids
                .iter()
                .flat_map(|id| citations.markers_for(*id).unwrap_or(&[]).iter().copied())
                .collect();
            markers.sort_unstable();
            markers.dedup();
            let marker_str: String = markers.iter().map(|n| format!("[{}]", n)).collect();
            notes.push_str(&format!(
                "- {} {} (confidence: {})\n",
                finding.claim,
                marker_str,
                finding.confidence.as_str()
            ));
        }

        let prompt = format!(
            "Research query: {}\n\
             Date: {}\n\n\
             Findings, each followed by its citation markers:\n{}\n\
             Write the full Markdown research report. Keep the inline [n] \
             markers exactly as given next to the claims they support; do \
             not invent new markers. Do not append a source list, it is \
             added automatically.",
            query,
            chrono::Utc::now().format("%Y-%m-%d"),
            notes
        );

        let body = self
            .llm
            .complete(CompletionRequest::new(prompt).with_system(SYSTEM_PROMPT))
            .await?;

        for cap in MARKER_RE.captures_iter(&body) {
            let number: u32 = cap[1].parse().unwrap_or(0);
            if !citations.contains_marker(number) {
                return Err(ReportError::CitationMismatch(format!(
                    "marker [{}] does not resolve to a source",
                    number
                )));
            }
        }

        let mut document = body.trim().to_string();
        if !citations.sources().is_empty() {
            document.push_str("\n\n## Sources\n\n");
            for source in citations.sources() {
                if source.title.is_empty() {
                    document.push_str(&format!("[{}] {}\n", source.number, source.url));
                } else {
                    document.push_str(&format!(
                        "[{}] {} - {}\n",
                        source.number, source.title, source.url
                    ));
                }
            }
        }

        Ok(document)
    }
}
