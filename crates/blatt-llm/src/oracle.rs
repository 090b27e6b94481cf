//! Relevance oracle: batch priority judgments for candidate papers.
//!
//! `LlmRelevanceOracle` sends up to ten papers per prompt and turns the
//! reply into one `Verdict` per paper. Malformed items are skipped and
//! uncovered papers get a neutral default, so callers always receive a
//! verdict for every input paper unless the whole reply is unusable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use blatt_common::{DomainMatch, Paper, Score};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::backend::{LlmBackend, LlmError, LlmRequest};
use crate::json::{extract_array, string_list};

pub const MAX_BATCH: usize = 10;
pub const ABSTRACT_CHARS: usize = 600;
pub const DEFAULT_PRIORITY: u8 = 3;

pub const REASON_NOT_COVERED: &str = "No analysis returned for this paper";
pub const REASON_NO_AI: &str = "No AI analysis (API key not set)";

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("LLM backend error: {0}")]
    Backend(#[from] LlmError),
    #[error("Unparseable oracle response: {0}")]
    Parse(String),
    #[error("Oracle call timed out after {0}s")]
    Timeout(u64),
}

/// What the user asked for, as the oracle sees it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserIntent {
    pub keywords: String,
    #[serde(default)]
    pub description: String,
}

impl UserIntent {
    pub fn new(keywords: impl Into<String>, description: impl Into<String>) -> Self {
        Self { keywords: keywords.into(), description: description.into() }
    }

    /// Keywords and description, lower-cased.
    pub fn text(&self) -> String {
        format!("{} {}", self.keywords, self.description).to_lowercase()
    }
}

/// The oracle's judgment of the paper at `index` within its batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub index: usize,
    pub priority: u8,
    pub matched_keywords: Vec<String>,
    pub domain_match: DomainMatch,
    pub reason: String,
}

impl Verdict {
    pub fn neutral(index: usize, reason: impl Into<String>) -> Self {
        Self {
            index,
            priority: DEFAULT_PRIORITY,
            matched_keywords: Vec::new(),
            domain_match: DomainMatch::General,
            reason: reason.into(),
        }
    }

    pub fn into_score(self, search_id: Uuid, paper_id: impl Into<String>) -> Score {
        let mut score = Score::new(search_id, paper_id, self.priority);
        score.matched_keywords = self.matched_keywords;
        score.domain_match = self.domain_match;
        score.reason = self.reason;
        score
    }
}

#[async_trait]
pub trait RelevanceOracle: Send + Sync {
    /// One verdict per paper, in input order.
    async fn score_batch(&self, papers: &[Paper], intent: &UserIntent) -> Result<Vec<Verdict>, OracleError>;

    /// False for oracles that never consult a model.
    fn is_ai(&self) -> bool {
        true
    }
}

// ── LLM-backed ───────────────────────────────────────────────────────────────

pub struct LlmRelevanceOracle {
    backend: Arc<dyn LlmBackend>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl LlmRelevanceOracle {
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            max_tokens: 2000,
            temperature: 0.0,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_generation(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn score_chunk(&self, papers: &[Paper], intent: &UserIntent) -> Result<Vec<Verdict>, OracleError> {
        let prompt = build_relevance_prompt(papers, intent);
        let req = LlmRequest::prompt(prompt, self.max_tokens, self.temperature);
        let resp = tokio::time::timeout(self.timeout, self.backend.complete(req))
            .await
            .map_err(|_| OracleError::Timeout(self.timeout.as_secs()))??;
        debug!(
            model = %resp.model,
            prompt_tokens = resp.prompt_tokens,
            completion_tokens = resp.completion_tokens,
            "Relevance batch answered"
        );
        parse_verdicts(&resp.content, papers.len())
    }
}

#[async_trait]
impl RelevanceOracle for LlmRelevanceOracle {
    #[instrument(skip(self, papers, intent), fields(n = papers.len()))]
    async fn score_batch(&self, papers: &[Paper], intent: &UserIntent) -> Result<Vec<Verdict>, OracleError> {
        let mut out = Vec::with_capacity(papers.len());
        for (chunk_no, chunk) in papers.chunks(MAX_BATCH).enumerate() {
            let offset = chunk_no * MAX_BATCH;
            let verdicts = self.score_chunk(chunk, intent).await?;
            out.extend(verdicts.into_iter().map(|mut v| {
                v.index += offset;
                v
            }));
        }
        Ok(out)
    }
}

// ── Null ─────────────────────────────────────────────────────────────────────

/// Used when no LLM is configured. Every paper gets the neutral priority.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOracle;

#[async_trait]
impl RelevanceOracle for NullOracle {
    async fn score_batch(&self, papers: &[Paper], _intent: &UserIntent) -> Result<Vec<Verdict>, OracleError> {
        Ok((0..papers.len()).map(|i| Verdict::neutral(i, REASON_NO_AI)).collect())
    }

    fn is_ai(&self) -> bool {
        false
    }
}

// ── Prompt ───────────────────────────────────────────────────────────────────

pub fn build_relevance_prompt(papers: &[Paper], intent: &UserIntent) -> String {
    let mut listing = String::new();
    for (i, p) in papers.iter().enumerate() {
        let abstract_text = p.abstract_text.as_deref().unwrap_or("No abstract");
        let snippet: String = abstract_text.chars().take(ABSTRACT_CHARS).collect();
        listing.push_str(&format!("\n--- Paper {i} ---\nTitle: {}\nAbstract: {}\n", p.title, snippet));
    }
    let description = if intent.description.trim().is_empty() { "None" } else { intent.description.as_str() };

    format!(
        r#"You are an academic paper analysis expert. Rate how relevant each paper below is to the user's research request.

[User request]
Keywords: {keywords}
Description: {description}

[Scoring]
Extract the m independent core concepts from the keywords and description, then for each paper count how many (k) its title or abstract covers.
- Priority 5: k = m and the paper's application domain matches the request.
- Priority 4: k = m but a different domain, or k = m-1 in the same domain.
- Priority 3: k <= m-2, or the paper is irrelevant.
Do not accept overly generic words as a concept hit (e.g. "simulation" alone is not a 3D virtual environment, "automation" alone is not autonomy).
Scenario words (training, testing, validation, evaluation, simulation, dataset) belong in matched_keywords as tags; they do not change the priority.

[Papers]
{listing}
[Output]
Return only a JSON array, one object per paper:
[
  {{"paper_index": 0, "priority": 5, "matched_keywords": ["..."], "domain_match": "exact_match", "reason": "m=3 contains 3/3 concepts - short explanation"}}
]
domain_match must be one of "exact_match", "mismatch", "general".
reason must start with "m=<m> contains <k>/<m> concepts"."#,
        keywords = intent.keywords,
    )
}

// ── Conversion ─────────────────────────────────────────────────────────────

/// Parse a batch reply into exactly `batch_len` verdicts, in index order.
///
/// Out-of-range or duplicate indices are skipped. Papers with no usable
/// entry get the neutral default.
pub fn parse_verdicts(content: &str, batch_len: usize) -> Result<Vec<Verdict>, OracleError> {
    let items = extract_array(content).ok_or_else(|| {
        let preview: String = content.chars().take(200).collect();
        OracleError::Parse(format!("no JSON array in response: {preview}"))
    })?;

    let mut slots: Vec<Option<Verdict>> = vec![None; batch_len];
    for item in &items {
        let index = item["paper_index"]
            .as_u64()
            .or_else(|| item["index"].as_u64())
            .map(|i| i as usize);
        let Some(index) = index.filter(|i| *i < batch_len) else {
            warn!(paper_index = %item["paper_index"], batch_len, "Invalid paper_index in oracle response, skipping");
            continue;
        };
        if slots[index].is_some() {
            warn!(index, "Duplicate paper_index in oracle response, keeping first");
            continue;
        }
        slots[index] = Some(item_to_verdict(item, index));
    }

    Ok(slots
        .into_iter()
        .enumerate()
        .map(|(i, v)| v.unwrap_or_else(|| Verdict::neutral(i, REASON_NOT_COVERED)))
        .collect())
}

fn item_to_verdict(item: &serde_json::Value, index: usize) -> Verdict {
    let priority = item["priority"]
        .as_i64()
        .or_else(|| item["priority"].as_f64().map(|f| f.round() as i64))
        .or_else(|| item["priority"].as_str().and_then(|s| s.trim().parse().ok()))
        .map(|p| p.clamp(1, 5) as u8)
        .unwrap_or(DEFAULT_PRIORITY);

    Verdict {
        index,
        priority,
        matched_keywords: string_list(&item["matched_keywords"]),
        domain_match: item["domain_match"]
            .as_str()
            .map(DomainMatch::parse_lenient)
            .unwrap_or_default(),
        reason: item["reason"].as_str().unwrap_or("").trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_verdicts_full_batch() {
        let content = r#"[
            {"paper_index": 1, "priority": 4, "matched_keywords": ["rail"], "domain_match": "mismatch", "reason": "m=2 contains 2/2 concepts"},
            {"paper_index": 0, "priority": 5, "matched_keywords": ["rail", "twin"], "domain_match": "exact_match", "reason": "ok"}
        ]"#;
        let v = parse_verdicts(content, 2).unwrap();
        assert_eq!(v.len(), 2);
        assert_eq!(v[0].index, 0);
        assert_eq!(v[0].priority, 5);
        assert_eq!(v[0].domain_match, DomainMatch::ExactMatch);
        assert_eq!(v[1].priority, 4);
        assert_eq!(v[1].domain_match, DomainMatch::Mismatch);
    }

    #[test]
    fn test_parse_verdicts_defaults_and_clamping() {
        let content = r#"[
            {"paper_index": 0, "priority": 9},
            {"paper_index": 1, "priority": "2", "domain_match": "something else"},
            {"paper_index": 7, "priority": 5},
            {"priority": 5}
        ]"#;
        let v = parse_verdicts(content, 3).unwrap();
        assert_eq!(v[0].priority, 5);
        assert!(v[0].matched_keywords.is_empty());
        assert_eq!(v[0].reason, "");
        assert_eq!(v[1].priority, 2);
        assert_eq!(v[1].domain_match, DomainMatch::General);
        assert_eq!(v[2].priority, DEFAULT_PRIORITY);
        assert_eq!(v[2].reason, REASON_NOT_COVERED);
    }

    #[test]
    fn test_parse_verdicts_extracts_wrapped_array() {
        let content = "Here is the analysis:\n[{\"paper_index\": 0, \"priority\": 0}]\nThanks";
        let v = parse_verdicts(content, 1).unwrap();
        assert_eq!(v[0].priority, 1);
    }

    #[test]
    fn test_parse_verdicts_rejects_non_json() {
        let err = parse_verdicts("I cannot help with that.", 4).unwrap_err();
        assert!(matches!(err, OracleError::Parse(_)));
    }

    #[test]
    fn test_duplicate_index_keeps_first() {
        let content = r#"[{"index": 0, "priority": 5}, {"index": 0, "priority": 1}]"#;
        assert_eq!(parse_verdicts(content, 1).unwrap()[0].priority, 5);
    }

    #[test]
    fn test_prompt_truncates_abstract() {
        let mut p = Paper::new("p", "Title");
        p.abstract_text = Some("x".repeat(2000));
        let prompt = build_relevance_prompt(&[p], &UserIntent::new("rail", ""));
        assert!(prompt.contains(&"x".repeat(ABSTRACT_CHARS)));
        assert!(!prompt.contains(&"x".repeat(ABSTRACT_CHARS + 1)));
        assert!(prompt.contains("Description: None"));
    }

    #[tokio::test]
    async fn test_null_oracle() {
        let papers = vec![Paper::new("a", "A"), Paper::new("b", "B")];
        let v = NullOracle.score_batch(&papers, &UserIntent::default()).await.unwrap();
        assert_eq!(v.len(), 2);
        assert!(v.iter().all(|x| x.priority == 3 && x.reason == REASON_NO_AI));
        assert!(!NullOracle.is_ai());
    }

    #[test]
    fn test_verdict_into_score() {
        let id = Uuid::new_v4();
        let s = Verdict::neutral(0, "r").into_score(id, "paper-1");
        assert_eq!(s.paper_id, "paper-1");
        assert_eq!(s.priority, 3);
        assert_eq!(s.search_id, id);
    }
}
