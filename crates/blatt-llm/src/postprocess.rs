//! Rule-based corrections applied to oracle scores.
//!
//! Every rule is a cap: it can lower a priority, never raise it. A note is
//! appended only when a rule actually lowered the priority, so running the
//! pass twice leaves the score unchanged.

use blatt_common::config::ScoringConfig;
use blatt_common::{DomainMatch, Score};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::oracle::UserIntent;

const LOW_COVERAGE_MARKERS: &[&str] = &["contains 0/", "contains 1/"];
const IRRELEVANT_MARKER: &str = "irrelevant";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostProcessRules {
    pub domain_terms: Vec<String>,
    pub missing_concept_phrases: Vec<String>,
    pub scenario_triggers: Vec<String>,
    pub scenario_terms: Vec<String>,
}

impl Default for PostProcessRules {
    fn default() -> Self {
        Self::from(&ScoringConfig::default())
    }
}

impl From<&ScoringConfig> for PostProcessRules {
    fn from(cfg: &ScoringConfig) -> Self {
        let lower = |v: &[String]| -> Vec<String> {
            v.iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect()
        };
        Self {
            domain_terms: lower(&cfg.domain_terms),
            missing_concept_phrases: lower(&cfg.missing_concept_phrases),
            scenario_triggers: lower(&cfg.scenario_triggers),
            scenario_terms: lower(&cfg.scenario_terms),
        }
    }
}

/// Case-insensitive whole-word containment (`\b` on both sides).
pub fn contains_word(haystack: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(needle)))
        .map(|re| re.is_match(haystack))
        .unwrap_or(false)
}

fn cap(score: &mut Score, max: u8, note: &str, notes: &mut Vec<String>) {
    if score.priority > max {
        score.priority = max;
        notes.push(note.to_string());
    }
}

/// Apply every rule to `score`. Returns true when the priority changed.
pub fn post_process(score: &mut Score, intent: &UserIntent, rules: &PostProcessRules) -> bool {
    let before = score.priority;
    let mut notes = Vec::new();
    let keywords = intent.keywords.to_lowercase();
    let reason = score.reason.to_lowercase();
    let matched: Vec<String> = score.matched_keywords.iter().map(|k| k.to_lowercase()).collect();

    let user_domain: Vec<&String> = rules.domain_terms.iter().filter(|t| keywords.contains(t.as_str())).collect();
    if score.priority == 5 && !user_domain.is_empty() {
        let hit = matched
            .iter()
            .any(|k| rules.domain_terms.iter().any(|t| contains_word(k, t)));
        if !hit {
            cap(score, 4, "Missing domain keyword, auto-downgraded to Priority 4", &mut notes);
        }
    }

    if score.domain_match == DomainMatch::Mismatch {
        cap(score, 4, "Domain mismatch, max Priority 4", &mut notes);
    }

    if rules.missing_concept_phrases.iter().any(|p| reason.contains(p.as_str())) {
        cap(score, 4, "Missing primary concept, auto-downgraded to Priority 4", &mut notes);
    }

    if LOW_COVERAGE_MARKERS.iter().any(|m| reason.contains(m)) {
        cap(score, 3, "Insufficient concept hits, downgraded to Priority 3", &mut notes);
    }

    if reason.contains(IRRELEVANT_MARKER) {
        cap(score, 3, "Marked as irrelevant, downgraded to Priority 3", &mut notes);
    }

    let user_text = intent.text();
    if rules.scenario_triggers.iter().any(|t| user_text.contains(t.as_str())) {
        let hit = matched
            .iter()
            .any(|k| rules.scenario_terms.iter().any(|t| k.contains(t.as_str())));
        if !hit {
            cap(score, 4, "Missing scenario keywords, downgraded to Priority 4", &mut notes);
        }
    }

    if notes.is_empty() {
        return false;
    }
    let joined = notes.join(" | ");
    score.reason = if score.reason.trim().is_empty() {
        joined
    } else {
        format!("{} | {}", score.reason, joined)
    };
    debug!(paper = %score.paper_id, from = before, to = score.priority, "Score post-processed");
    score.priority != before
}
