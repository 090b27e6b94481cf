//! Relevance scores attached to `(search session, paper)` pairs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::paper::Paper;

/// Lowest priority still shown to the user.
pub const LOWEST_VISIBLE_PRIORITY: u8 = 3;
/// Highest priority an oracle may assign.
pub const TOP_PRIORITY: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DomainMatch {
    ExactMatch,
    Mismatch,
    #[default]
    General,
}

impl DomainMatch {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainMatch::ExactMatch => "exact_match",
            DomainMatch::Mismatch   => "mismatch",
            DomainMatch::General    => "general",
        }
    }

    /// Anything unrecognised is `general`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "exact_match" | "exact" => DomainMatch::ExactMatch,
            "mismatch"              => DomainMatch::Mismatch,
            _                       => DomainMatch::General,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub search_id: Uuid,
    pub paper_id: String,
    /// 1–5. Tiers 1–2 are excluded results.
    pub priority: u8,
    #[serde(default)]
    pub matched_keywords: Vec<String>,
    #[serde(default)]
    pub domain_match: DomainMatch,
    #[serde(default)]
    pub reason: String,
}

impl Score {
    pub fn new(search_id: Uuid, paper_id: impl Into<String>, priority: u8) -> Self {
        Self {
            search_id,
            paper_id: paper_id.into(),
            priority: priority.clamp(1, TOP_PRIORITY),
            matched_keywords: Vec::new(),
            domain_match: DomainMatch::General,
            reason: String::new(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn is_visible(&self) -> bool {
        self.priority >= LOWEST_VISIBLE_PRIORITY
    }
}

/// A paper joined with its score, as returned to callers and exporters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPaper {
    #[serde(flatten)]
    pub paper: Paper,
    pub score: Score,
}

impl RankedPaper {
    pub fn priority(&self) -> u8 {
        self.score.priority
    }
}
