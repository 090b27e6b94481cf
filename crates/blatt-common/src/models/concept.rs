//! User intent: concepts, search queries and the translation that produces them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConceptLevel {
    #[default]
    Primary,
    Secondary,
}

/// A semantic unit of user intent with its surface forms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub name: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub level: ConceptLevel,
}

impl Concept {
    pub fn new(name: impl Into<String>, synonyms: Vec<String>) -> Self {
        Self { name: name.into(), synonyms, level: ConceptLevel::Primary }
    }

    /// Concept whose only synonym is the phrase itself.
    pub fn from_phrase(phrase: &str) -> Self {
        let p = phrase.trim().to_string();
        Self::new(p.clone(), vec![p])
    }

    /// Accepts `{"name", "synonyms", "level"}`, a bare string, or a list of synonyms.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(Self::from_phrase(s)),
            serde_json::Value::Array(items) => {
                let synonyms: Vec<String> = items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .map(String::from)
                    .collect();
                let name = synonyms.first()?.clone();
                Some(Self::new(name, synonyms))
            }
            serde_json::Value::Object(_) => {
                let synonyms: Vec<String> = value["synonyms"]
                    .as_array()
                    .map(|a| a.iter().filter_map(|v| v.as_str()).map(String::from).collect())
                    .unwrap_or_default();
                let name = value["name"]
                    .as_str()
                    .map(String::from)
                    .filter(|n| !n.trim().is_empty())
                    .unwrap_or_else(|| synonyms.join(","));
                let level = match value["level"].as_str() {
                    Some("secondary") => ConceptLevel::Secondary,
                    _ => ConceptLevel::Primary,
                };
                Some(Self { name, synonyms, level })
            }
            _ => None,
        }
    }
}

/// One query the aggregator will issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

fn default_strategy() -> String { "translated".to_string() }
fn default_weight()   -> f32    { 1.0 }

impl SearchQuery {
    pub fn new(text: impl Into<String>, strategy: impl Into<String>) -> Self {
        Self { text: text.into(), strategy: strategy.into(), weight: 1.0 }
    }
}

/// Output of query translation, kept on the session for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Translation {
    #[serde(default)]
    pub semantic_understanding: String,
    #[serde(default)]
    pub professional_terms: Vec<String>,
    #[serde(default)]
    pub core_concepts: Vec<Concept>,
    #[serde(default)]
    pub query_combinations: Vec<SearchQuery>,
    #[serde(default)]
    pub avoid_terms: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
    /// True when produced by the rule-based fallback instead of an LLM.
    #[serde(default)]
    pub fallback: bool,
}

/// Split user keywords on `,` `;` `/` and newlines.
pub fn split_keywords(text: &str) -> Vec<String> {
    text.split([',', ';', '/', '\n'])
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Clean raw concepts; fall back to keyword-derived ones when none survive.
pub fn sanitize_concepts(
    raw: &[Concept],
    keywords: &str,
    professional_terms: &[String],
) -> Vec<Concept> {
    let mut out = Vec::new();
    for c in raw {
        let mut synonyms: Vec<String> = c
            .synonyms
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        let name = c.name.trim();
        if synonyms.is_empty() && !name.is_empty() {
            synonyms.push(name.to_string());
        }
        if synonyms.is_empty() {
            continue;
        }
        let name = if name.is_empty() { synonyms[0].clone() } else { name.to_string() };
        out.push(Concept { name, synonyms, level: c.level });
    }

    if out.is_empty() {
        out = relaxed_concepts(keywords, professional_terms);
    }
    out
}

/// Up to three concepts taken straight from the keyword split.
pub fn relaxed_concepts(keywords: &str, professional_terms: &[String]) -> Vec<Concept> {
    let mut seen = HashSet::new();
    split_keywords(keywords)
        .into_iter()
        .chain(professional_terms.iter().cloned())
        .filter(|t| !t.trim().is_empty() && seen.insert(t.to_lowercase()))
        .take(3)
        .map(|t| Concept::from_phrase(&t))
        .collect()
}
