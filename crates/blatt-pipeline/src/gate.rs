//! Hard-Requirement Gate.
//!
//! A cheap lexical check that runs before the relevance oracle. Only
//! explicit avoid terms reject a paper. Concept coverage sets a tier that
//! travels with the paper as context. The batch policy guarantees the gate
//! never starves the oracle: if too few papers survive, the batch passes
//! through untouched.

use std::collections::HashMap;

use blatt_common::config::GateConfig;
use blatt_common::{Concept, Paper};
use blatt_llm::postprocess::contains_word;
use tracing::{debug, info};

const SCENARIO_KEYWORDS: &[(&str, &[&str])] = &[
    ("training", &["training", "learning"]),
    ("testing", &["testing", "test", "benchmark"]),
    ("validation", &["validation", "verify", "evaluation"]),
    ("simulation", &["simulation", "simulator", "virtual"]),
    ("dataset", &["dataset", "data set", "corpus", "benchmark"]),
    ("visualization", &["visualization", "visualisation", "render"]),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateVerdict {
    pub keep: bool,
    pub tier: u8,
    pub matched: usize,
    pub total: usize,
    pub reason: String,
}

/// Outcome of gating one batch.
#[derive(Debug, Clone, Default)]
pub struct GuardOutcome {
    pub papers: Vec<Paper>,
    /// Verdicts from the concept set that was applied, by paper id.
    pub verdicts: HashMap<String, GateVerdict>,
    /// The filtered set was too small and the input passed through.
    pub fallback_used: bool,
    /// Papers the filter rejected, whether or not the fallback fired.
    pub rejected: usize,
    pub used_relaxed: bool,
}

/// Description tags shown alongside the coverage count. They never gate.
pub fn scenario_tags(description: &str) -> Vec<String> {
    let text = description.to_lowercase();
    SCENARIO_KEYWORDS
        .iter()
        .filter(|(_, words)| words.iter().any(|w| text.contains(w)))
        .map(|(tag, _)| tag.to_string())
        .collect()
}

/// Multi-word synonyms match as substrings, single tokens on word boundaries.
fn synonym_matches(text: &str, synonym: &str) -> bool {
    let s = synonym.trim().to_lowercase();
    if s.is_empty() {
        false
    } else if s.contains(char::is_whitespace) {
        text.contains(&s)
    } else {
        contains_word(text, &s)
    }
}

#[derive(Debug, Clone)]
pub struct HardRequirementGate {
    min_match_ratio: f64,
    min_survivors: usize,
    scenario_tags: Vec<String>,
}

impl HardRequirementGate {
    pub fn new(min_match_ratio: f64, min_survivors: usize) -> Self {
        Self {
            min_match_ratio: min_match_ratio.clamp(0.0, 1.0),
            min_survivors,
            scenario_tags: Vec::new(),
        }
    }

    pub fn from_config(cfg: &GateConfig) -> Self {
        Self::new(cfg.min_match_ratio, cfg.min_survivors)
    }

    /// Record scenario tags from the user's description.
    pub fn with_description(mut self, description: &str) -> Self {
        self.scenario_tags = scenario_tags(description);
        self
    }

    pub fn min_match_ratio(&self) -> f64 {
        self.min_match_ratio
    }

    /// `max(1, ceil(n * ratio))`, or 0 without concepts.
    pub fn threshold(&self, concept_count: usize) -> usize {
        if concept_count == 0 {
            return 0;
        }
        ((concept_count as f64 * self.min_match_ratio).ceil() as usize).max(1)
    }

    fn reason(&self, matched: usize, total: usize, note: &str) -> String {
        let tags = if self.scenario_tags.is_empty() {
            "None".to_string()
        } else {
            self.scenario_tags.join(", ")
        };
        let mut reason = format!("Concept coverage: {matched}/{total} | Scenario tags: {tags}");
        if !note.is_empty() {
            reason.push_str(" | ");
            reason.push_str(note);
        }
        reason
    }

    pub fn eligible(&self, paper: &Paper, concepts: &[Concept], avoid_terms: &[String]) -> GateVerdict {
        let text = paper.text();

        let avoid_hit = avoid_terms
            .iter()
            .map(|t| t.trim().to_lowercase())
            .find(|t| !t.is_empty() && text.contains(t.as_str()));
        if let Some(term) = avoid_hit {
            return GateVerdict {
                keep: false,
                tier: 2,
                matched: 0,
                total: concepts.len(),
                reason: format!("Contains excluded term: {term}"),
            };
        }

        let total = concepts.len();
        if total == 0 {
            return GateVerdict {
                keep: true,
                tier: 5,
                matched: 0,
                total: 0,
                reason: self.reason(0, 0, "No explicit concept constraints"),
            };
        }

        let matched = concepts
            .iter()
            .filter(|c| c.synonyms.iter().any(|s| synonym_matches(&text, s)))
            .count();
        let threshold = self.threshold(total);

        let (tier, note) = if matched >= threshold {
            (5, "")
        } else if matched >= threshold.saturating_sub(1).max(1) {
            (4, "Partial concept match (relaxed)")
        } else if matched > 0 {
            (3, "Few concepts matched (baseline candidate)")
        } else {
            (3, "AI-only judgment (gatekeeper baseline)")
        };

        GateVerdict { keep: true, tier, matched, total, reason: self.reason(matched, total, note) }
    }

    fn filter(&self, papers: &[Paper], concepts: &[Concept], avoid_terms: &[String]) -> (Vec<Paper>, HashMap<String, GateVerdict>) {
        let mut kept = Vec::new();
        let mut verdicts = HashMap::new();
        for paper in papers {
            let verdict = self.eligible(paper, concepts, avoid_terms);
            if verdict.keep {
                kept.push(paper.clone());
            } else {
                debug!(paper = %paper.id, reason = %verdict.reason, "Gate rejected paper");
            }
            verdicts.insert(paper.id.clone(), verdict);
        }
        (kept, verdicts)
    }

    /// Gate a batch with the strict concepts (relaxed ones when there are
    /// no strict ones), retrying relaxed if strict keeps nothing. When fewer
    /// than `min_survivors` remain, the input is returned unchanged.
    pub fn guard_batch(
        &self,
        papers: Vec<Paper>,
        strict: &[Concept],
        relaxed: &[Concept],
        avoid_terms: &[String],
    ) -> GuardOutcome {
        let mut used_relaxed = strict.is_empty();
        let primary = if used_relaxed { relaxed } else { strict };
        let (mut kept, mut verdicts) = self.filter(&papers, primary, avoid_terms);

        if kept.is_empty() && !used_relaxed && !relaxed.is_empty() {
            debug!("Strict concepts kept nothing, retrying with relaxed concepts");
            (kept, verdicts) = self.filter(&papers, relaxed, avoid_terms);
            used_relaxed = true;
        }

        let rejected = papers.len() - kept.len();
        if kept.is_empty() || kept.len() < self.min_survivors {
            info!(
                input = papers.len(),
                survivors = kept.len(),
                min_survivors = self.min_survivors,
                "Gate fallback: passing batch through unfiltered"
            );
            return GuardOutcome { papers, verdicts, fallback_used: true, rejected, used_relaxed };
        }

        info!(input = papers.len(), kept = kept.len(), rejected, "Gate applied");
        GuardOutcome { papers: kept, verdicts, fallback_used: false, rejected, used_relaxed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn p(id: &str, title: &str, abstract_text: &str) -> Paper {
        let mut paper = Paper::new(id, title);
        paper.abstract_text = Some(abstract_text.to_string());
        paper
    }

    fn concepts(names: &[&str]) -> Vec<Concept> {
        names.iter().map(|n| Concept::from_phrase(n)).collect()
    }

    #[test]
    fn test_avoid_term_rejects() {
        let gate = HardRequirementGate::new(0.6, 30);
        let paper = p("1", "Autonomous automotive navigation", "");
        let v = gate.eligible(&paper, &concepts(&["autonomous"]), &["Automotive".to_string()]);
        assert!(!v.keep);
        assert_eq!(v.tier, 2);
        assert_eq!(v.reason, "Contains excluded term: automotive");
    }

    #[test]
    fn test_no_concepts_is_top_tier() {
        let gate = HardRequirementGate::new(0.6, 30).with_description("for training and validation");
        let v = gate.eligible(&p("1", "Anything", ""), &[], &[]);
        assert!(v.keep);
        assert_eq!(v.tier, 5);
        assert_eq!(
            v.reason,
            "Concept coverage: 0/0 | Scenario tags: training, validation | No explicit concept constraints"
        );
    }

    #[test]
    fn test_tiers_by_coverage() {
        // 5 concepts, ratio 0.6 -> threshold 3.
        let gate = HardRequirementGate::new(0.6, 30);
        let cs = concepts(&["rail", "digital twin", "lidar", "maintenance", "simulation"]);
        assert_eq!(gate.threshold(5), 3);

        let v = gate.eligible(&p("1", "Rail digital twin with lidar", ""), &cs, &[]);
        assert_eq!((v.tier, v.matched), (5, 3));
        assert_eq!(v.reason, "Concept coverage: 3/5 | Scenario tags: None");

        let v = gate.eligible(&p("2", "Rail digital twin", ""), &cs, &[]);
        assert_eq!(v.tier, 4);
        assert!(v.reason.ends_with("Partial concept match (relaxed)"));

        let v = gate.eligible(&p("3", "Rail planning", ""), &cs, &[]);
        assert_eq!(v.tier, 3);
        assert!(v.reason.ends_with("Few concepts matched (baseline candidate)"));

        let v = gate.eligible(&p("4", "Protein folding", ""), &cs, &[]);
        assert_eq!((v.tier, v.keep), (3, true));
        assert!(v.reason.ends_with("AI-only judgment (gatekeeper baseline)"));
    }

    #[test]
    fn test_single_token_needs_word_boundary() {
        let gate = HardRequirementGate::new(1.0, 0);
        let cs = concepts(&["train"]);
        assert_eq!(gate.eligible(&p("1", "Training deep nets", ""), &cs, &[]).matched, 0);
        assert_eq!(gate.eligible(&p("2", "Autonomous train control", ""), &cs, &[]).matched, 1);
    }

    #[test]
    fn test_synonyms_any_match() {
        let gate = HardRequirementGate::new(1.0, 0);
        let c = vec![Concept::new("twin", vec!["digital twin".into(), "virtual replica".into()])];
        let v = gate.eligible(&p("1", "A", "We build a virtual replica of the line"), &c, &[]);
        assert_eq!(v.tier, 5);
    }

    #[test]
    fn test_ratio_is_clamped() {
        assert_eq!(HardRequirementGate::new(7.0, 0).min_match_ratio(), 1.0);
        assert_eq!(HardRequirementGate::new(-1.0, 0).threshold(4), 1);
    }

    #[test]
    fn test_guard_batch_passes_through_below_min_survivors() {
        let gate = HardRequirementGate::new(0.6, 30);
        let papers: Vec<Paper> = (0..10)
            .map(|i| p(&i.to_string(), if i < 3 { "automotive lidar" } else { "rail lidar" }, ""))
            .collect();
        let out = gate.guard_batch(papers.clone(), &concepts(&["lidar"]), &[], &["automotive".to_string()]);
        assert!(out.fallback_used);
        assert_eq!(out.rejected, 3);
        assert_eq!(out.papers, papers);
    }

    #[test]
    fn test_guard_batch_filters_with_enough_survivors() {
        let gate = HardRequirementGate::new(0.6, 2);
        let papers = vec![
            p("1", "automotive lidar", ""),
            p("2", "rail lidar", ""),
            p("3", "rail radar", ""),
        ];
        let out = gate.guard_batch(papers, &concepts(&["lidar"]), &[], &["automotive".to_string()]);
        assert!(!out.fallback_used);
        let ids: Vec<_> = out.papers.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "3"]);
        assert_eq!(out.verdicts["3"].tier, 3);
    }

    #[test]
    fn test_guard_batch_concept_set_selection() {
        let gate = HardRequirementGate::new(0.6, 1);
        let papers = vec![p("1", "rail twin", "")];
        let out = gate.guard_batch(papers, &concepts(&["rail"]), &concepts(&["twin"]), &[]);
        assert!(!out.used_relaxed);
        assert_eq!(out.papers.len(), 1);

        let out = gate.guard_batch(vec![p("2", "x", "")], &[], &concepts(&["twin"]), &[]);
        assert!(out.used_relaxed);
    }

    #[test]
    fn test_scenario_tags() {
        assert_eq!(scenario_tags("A benchmark corpus for rendering"), vec!["testing", "dataset", "visualization"]);
        assert!(scenario_tags("").is_empty());
    }
}
