//! Typed citation edges: asks the model how a citing paper relates to the
//! paper it cites.

use std::sync::Arc;
use std::time::Duration;

use blatt_common::{Paper, RelationshipType};
use tracing::{debug, instrument, warn};

use crate::backend::{LlmBackend, LlmRequest};
use crate::json::extract_object;

const ABSTRACT_CHARS: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub relationship_type: RelationshipType,
    pub description: String,
}

impl Classification {
    fn plain_citation() -> Self {
        Self { relationship_type: RelationshipType::Cites, description: "cites".to_string() }
    }
}

pub struct RelationshipClassifier {
    backend: Arc<dyn LlmBackend>,
    timeout: Duration,
}

impl RelationshipClassifier {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend, timeout: Duration::from_secs(60) }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Failures yield a plain `cites` edge.
    #[instrument(skip(self, citing, cited), fields(citing = %citing.id, cited = %cited.id))]
    pub async fn classify(&self, citing: &Paper, cited: &Paper) -> Classification {
        let req = LlmRequest::prompt(build_relationship_prompt(citing, cited), 200, 0.0);
        match tokio::time::timeout(self.timeout, self.backend.complete(req)).await {
            Ok(Ok(resp)) => {
                let c = parse_classification(&resp.content);
                debug!(kind = %c.relationship_type, "Relationship classified");
                c
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Relationship classification failed");
                Classification::plain_citation()
            }
            Err(_) => {
                warn!(secs = self.timeout.as_secs(), "Relationship classification timed out");
                Classification::plain_citation()
            }
        }
    }
}

fn snippet(p: &Paper) -> String {
    p.abstract_text
        .as_deref()
        .unwrap_or("No abstract")
        .chars()
        .take(ABSTRACT_CHARS)
        .collect()
}

pub fn build_relationship_prompt(citing: &Paper, cited: &Paper) -> String {
    format!(
        r#"Paper A cites Paper B. Classify the relationship.

Paper A: {a_title}
Abstract: {a_abs}

Paper B: {b_title}
Abstract: {b_abs}

Types:
- improves: A improves on B's method
- builds_on: A builds on B's work
- compares: A compares against B
- applies: A applies B's method to a new problem
- surveys: A reviews B as part of a survey
- extends: A extends B's theory or framework
- cites: plain citation with no stronger relation

Return only JSON: {{"type": "<one of the types>", "description": "<at most 15 words>"}}"#,
        a_title = citing.title,
        a_abs = snippet(citing),
        b_title = cited.title,
        b_abs = snippet(cited),
    )
}

// ── Conversion ─────────────────────────────────────────────────────────────

pub fn parse_classification(content: &str) -> Classification {
    let Some(v) = extract_object(content) else {
        return Classification::plain_citation();
    };
    let relationship_type = v["type"].as_str().map(RelationshipType::parse_lenient).unwrap_or_default();
    let description = v["description"]
        .as_str()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(relationship_type.as_str())
        .to_string();
    Classification { relationship_type, description }
}
