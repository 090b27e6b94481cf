//! Turns the user's keywords and description into search queries and
//! concepts. Falls back to a keyword split whenever the model is missing
//! or its answer is unusable.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use blatt_common::{Concept, SearchQuery, Translation};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::backend::{LlmBackend, LlmRequest};
use crate::json::{extract_object, string_list};

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\b\w+\b").unwrap();
}

const STOPWORDS: &[&str] = &["the", "a", "an", "for", "and", "or", "in", "on", "at", "to"];
const FALLBACK_UNDERSTANDING: &str = "Simple rule analysis (LLM not configured)";
const FALLBACK_FOCUS: &str = "Basic keyword combination";

pub struct QueryTranslator {
    backend: Option<Arc<dyn LlmBackend>>,
    max_tokens: u32,
    temperature: f32,
    timeout: Duration,
}

impl QueryTranslator {
    pub fn new(backend: Option<Arc<dyn LlmBackend>>) -> Self {
        Self {
            backend,
            max_tokens: 1500,
            temperature: 0.3,
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Never fails. Check `Translation::fallback` to see which path ran.
    #[instrument(skip(self))]
    pub async fn translate(&self, keywords: &str, description: &str) -> Translation {
        let Some(backend) = &self.backend else {
            info!("No LLM configured, using rule-based translation");
            return fallback_translation(keywords, description);
        };

        let req = LlmRequest::prompt(build_translation_prompt(keywords, description), self.max_tokens, self.temperature);
        let content = match tokio::time::timeout(self.timeout, backend.complete(req)).await {
            Ok(Ok(resp)) => resp.content,
            Ok(Err(e)) => {
                warn!(error = %e, "Translation call failed, using rule-based translation");
                return fallback_translation(keywords, description);
            }
            Err(_) => {
                warn!(secs = self.timeout.as_secs(), "Translation call timed out, using rule-based translation");
                return fallback_translation(keywords, description);
            }
        };

        match parse_translation(&content) {
            Some(t) => {
                info!(queries = t.query_combinations.len(), concepts = t.core_concepts.len(), "Query translation complete");
                t
            }
            None => {
                warn!("Translation response unusable, using rule-based translation");
                fallback_translation(keywords, description)
            }
        }
    }
}

pub fn build_translation_prompt(keywords: &str, description: &str) -> String {
    let description = if description.trim().is_empty() { "None" } else { description };
    format!(
        r#"You are an academic search expert. Translate the user's research request into precise search queries for academic databases.

Keywords: {keywords}
Description: {description}

Steps:
1. Summarise what the user is really looking for.
2. List the professional terms a paper on this topic would use.
3. Identify 2-4 core concepts. Give each its synonyms and mark it "primary" or "secondary".
4. Write 3-6 English search queries of 2-6 words each, combining the concepts in different ways. Tag each with its focus (e.g. "core", "survey", "framework").
5. List terms whose presence means a paper is off-topic.

Return only JSON:
{{
  "semantic_understanding": "...",
  "professional_terms": ["..."],
  "core_concepts": [{{"name": "...", "synonyms": ["..."], "level": "primary"}}],
  "query_combinations": [{{"query": "...", "focus": "...", "weight": 1.0}}],
  "avoid_terms": ["..."],
  "reasoning": "..."
}}"#
    )
}

// ── Conversion ─────────────────────────────────────────────────────────────

/// `None` when the reply has no object or no usable queries.
pub fn parse_translation(content: &str) -> Option<Translation> {
    let v = extract_object(content)?;

    let query_combinations: Vec<SearchQuery> = v["query_combinations"]
        .as_array()
        .map(|items| items.iter().filter_map(query_from_json).collect())
        .unwrap_or_default();
    if query_combinations.is_empty() {
        return None;
    }

    let core_concepts = v["core_concepts"]
        .as_array()
        .map(|items| items.iter().filter_map(Concept::from_json).collect())
        .unwrap_or_default();

    Some(Translation {
        semantic_understanding: v["semantic_understanding"].as_str().unwrap_or("").to_string(),
        professional_terms: string_list(&v["professional_terms"]),
        core_concepts,
        query_combinations,
        avoid_terms: string_list(&v["avoid_terms"]),
        reasoning: v["reasoning"].as_str().unwrap_or("").to_string(),
        fallback: false,
    })
}

fn query_from_json(v: &Value) -> Option<SearchQuery> {
    let (text, focus, weight) = match v {
        Value::String(s) => (s.as_str(), "translated", 1.0),
        Value::Object(_) => (
            v["query"].as_str()?,
            v["focus"].as_str().unwrap_or("translated"),
            v["weight"].as_f64().unwrap_or(1.0),
        ),
        _ => return None,
    };
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let mut q = SearchQuery::new(text, focus.trim());
    q.weight = weight as f32;
    Some(q)
}

/// Keyword split used when no model is available.
pub fn fallback_translation(keywords: &str, description: &str) -> Translation {
    let description_words = WORD.find_iter(description).map(|m| m.as_str()).take(5);
    let mut seen = HashSet::new();
    let words: Vec<String> = WORD
        .find_iter(keywords)
        .map(|m| m.as_str())
        .chain(description_words)
        .filter(|w| !STOPWORDS.contains(&w.to_lowercase().as_str()))
        .filter(|w| seen.insert(w.to_lowercase()))
        .map(String::from)
        .collect();

    let query_text = words.iter().take(8).cloned().collect::<Vec<_>>().join(" ");
    let query_combinations = if query_text.is_empty() {
        Vec::new()
    } else {
        vec![SearchQuery::new(query_text, FALLBACK_FOCUS)]
    };

    Translation {
        semantic_understanding: FALLBACK_UNDERSTANDING.to_string(),
        professional_terms: words.iter().take(10).cloned().collect(),
        core_concepts: words.iter().take(3).map(|w| Concept::from_phrase(w)).collect(),
        query_combinations,
        avoid_terms: Vec::new(),
        reasoning: String::new(),
        fallback: true,
    }
}
