//! Convergence Controller.
//!
//! Drives one search session through translate → search → gate → initial
//! scoring → seed selection → citation expansion → expanded scoring →
//! consolidation → relationship classification. Each stage boundary is
//! persisted on the session and broadcast as a `PipelineEvent`.
//!
//! Only two stages can fail a session: a store write and the initial
//! scoring pass. Source, expansion and classification errors are logged,
//! collected in `SearchOutcome::errors`, and the run continues.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use blatt_common::config::{BlattConfig, ExpansionConfig, GateConfig, SearchConfig};
use blatt_common::models::{relaxed_concepts, sanitize_concepts, SessionError};
use blatt_common::{
    Paper, PipelineStage, RankedPaper, Relationship, Score, SearchQuery, SearchSession, SessionStatus,
    Translation,
};
use blatt_llm::{OracleError, QueryTranslator, RelationshipClassifier, UserIntent};
use blatt_sources::dedup::title_year_key;
use blatt_sources::{CandidateAggregator, PaperSource};
use blatt_store::{PaperStore, StoreError};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use crate::events::{EventSink, PipelineEvent};
use crate::expander::{CitationExpander, ExpansionBudget};
use crate::gate::HardRequirementGate;
use crate::scorer::{Scorer, ScoringMode};

/// Priorities below this never reach the consolidated result.
pub const MIN_VISIBLE_PRIORITY: u8 = 4;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Initial scoring failed: {0}")]
    Oracle(#[from] OracleError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Per-run overrides of the configured search limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub total_limit: Option<usize>,
    pub citation_depth: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeStats {
    pub candidates: usize,
    pub gated: usize,
    pub gate_rejected: usize,
    pub gate_fallback: bool,
    pub initial_scored: usize,
    pub tier5_seeds: usize,
    pub tier4_seeds: usize,
    pub expanded_papers: usize,
    pub expanded_scored: usize,
    pub budget_exhausted: bool,
    pub failed_batches: usize,
    pub relationships_classified: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub session: SearchSession,
    /// Consolidated result: priority ≥ 4, deduplicated, best first.
    pub papers: Vec<RankedPaper>,
    /// Stored relationships among `papers`.
    pub relationships: Vec<Relationship>,
    pub stats: OutcomeStats,
    pub duration_ms: u64,
    /// Non-fatal errors collected along the way.
    pub errors: Vec<String>,
}

impl SearchOutcome {
    pub fn is_completed(&self) -> bool {
        self.session.status == SessionStatus::Completed
    }
}

/// Mutable state threaded through the stages of one run.
struct RunState {
    session: SearchSession,
    intent: UserIntent,
    translation: Translation,
    /// Every paper seen this run, by first appearance.
    all_papers: Vec<Paper>,
    seen: HashSet<String>,
    papers: Vec<RankedPaper>,
    relationships: Vec<Relationship>,
    stats: OutcomeStats,
    errors: Vec<String>,
}

impl RunState {
    fn absorb(&mut self, papers: &[Paper]) -> Vec<Paper> {
        let mut fresh = Vec::new();
        for paper in papers {
            if self.seen.insert(paper.id.clone()) {
                self.all_papers.push(paper.clone());
                fresh.push(paper.clone());
            }
        }
        fresh
    }
}

pub struct ConvergenceController {
    aggregator: Arc<CandidateAggregator>,
    translator: Arc<QueryTranslator>,
    scorer: Arc<Scorer>,
    classifier: Option<Arc<RelationshipClassifier>>,
    graph_source: Option<Arc<dyn PaperSource>>,
    store: Arc<dyn PaperStore>,
    search: SearchConfig,
    gate: GateConfig,
    expansion: ExpansionConfig,
    max_relationship_analyses: usize,
    expander_timeout: Duration,
    events: EventSink,
}

impl ConvergenceController {
    /// The graph source defaults to the first registered adapter that
    /// supports citation lookups.
    pub fn new(
        aggregator: Arc<CandidateAggregator>,
        translator: Arc<QueryTranslator>,
        scorer: Arc<Scorer>,
        store: Arc<dyn PaperStore>,
        config: &BlattConfig,
    ) -> Self {
        let graph_source = aggregator.registry().graph_source();
        Self {
            aggregator,
            translator,
            scorer,
            classifier: None,
            graph_source,
            store,
            search: config.search.clone(),
            gate: config.gate.clone(),
            expansion: config.expansion.clone(),
            max_relationship_analyses: config.scoring.max_relationship_analyses,
            expander_timeout: Duration::from_secs(config.sources.call_timeout_secs),
            events: EventSink::none(),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<RelationshipClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_graph_source(mut self, source: Option<Arc<dyn PaperSource>>) -> Self {
        self.graph_source = source;
        self
    }

    pub fn with_events(mut self, tx: broadcast::Sender<PipelineEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    pub fn with_expander_timeout(mut self, timeout: Duration) -> Self {
        self.expander_timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn PaperStore> {
        &self.store
    }

    pub async fn run(&self, session: SearchSession) -> SearchOutcome {
        self.run_with(session, RunOptions::default()).await
    }

    /// Run the session to a terminal state. Never returns an error: a fatal
    /// failure is recorded on the returned session instead.
    #[instrument(skip(self, session, options), fields(session = %session.id))]
    pub async fn run_with(&self, session: SearchSession, options: RunOptions) -> SearchOutcome {
        let start = Instant::now();
        let intent = UserIntent::new(session.keywords.clone(), session.description.clone());
        let mut state = RunState {
            session,
            intent,
            translation: Translation::default(),
            all_papers: Vec::new(),
            seen: HashSet::new(),
            papers: Vec::new(),
            relationships: Vec::new(),
            stats: OutcomeStats::default(),
            errors: Vec::new(),
        };

        if let Err(e) = self.execute(&mut state, options).await {
            self.record_failure(&mut state, &e).await;
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            session = %state.session.id,
            status = state.session.status.as_str(),
            total = state.session.total_papers,
            relevant = state.session.relevant_papers,
            duration_ms,
            "Search session finished"
        );
        SearchOutcome {
            session: state.session,
            papers: state.papers,
            relationships: state.relationships,
            stats: state.stats,
            duration_ms,
            errors: state.errors,
        }
    }

    async fn record_failure(&self, state: &mut RunState, error: &PipelineError) {
        warn!(session = %state.session.id, stage = ?state.session.stage, error = %error, "Search session failed");
        if state.session.fail(error.to_string()).is_err() {
            return;
        }
        if let Err(e) = self.store.update_session(&state.session).await {
            warn!(session = %state.session.id, error = %e, "Could not persist failed session");
            state.errors.push(format!("store: {e}"));
        }
        self.events.emit(state.session.id, PipelineStage::Failed, error.to_string(), 0);
    }

    async fn advance(&self, state: &mut RunState, stage: PipelineStage, message: String, count: usize) -> Result<(), PipelineError> {
        state.session.advance(stage)?;
        self.store.update_session(&state.session).await?;
        info!(session = %state.session.id, stage = ?stage, count, "{message}");
        self.events.emit(state.session.id, stage, message, count);
        Ok(())
    }

    async fn execute(&self, state: &mut RunState, options: RunOptions) -> Result<(), PipelineError> {
        let total_limit = options.total_limit.unwrap_or(self.search.total_limit);
        let depth = options.citation_depth.unwrap_or(self.search.citation_depth);
        let id = state.session.id;

        // ── 0. Translate ─────────────────────────────────────────────────────
        state.translation = self.translator.translate(&state.session.keywords, &state.session.description).await;
        state.session.translation = Some(state.translation.clone());
        self.store.create_session(&state.session).await?;
        let queries = search_queries(&state.translation, &state.session.keywords);
        self.events.emit(id, PipelineStage::Initiated, format!("Generated {} search queries", queries.len()), queries.len());

        // ── 1. Search ────────────────────────────────────────────────────────
        let aggregation = self
            .aggregator
            .search_with_queries(&queries, self.search.papers_per_query, total_limit, self.search.year_from)
            .await;
        state.errors.extend(aggregation.errors.iter().cloned());
        let candidates = state.absorb(&aggregation.papers);
        state.stats.candidates = candidates.len();
        self.store.upsert_papers(&candidates).await?;
        self.advance(state, PipelineStage::Searched, format!("Found {} candidate papers", candidates.len()), candidates.len())
            .await?;

        if candidates.is_empty() {
            return self.complete(state).await;
        }

        // ── 2. Gate ──────────────────────────────────────────────────────────
        let keywords = state.session.keywords.clone();
        let strict = sanitize_concepts(&state.translation.core_concepts, &keywords, &state.translation.professional_terms);
        let relaxed = relaxed_concepts(&keywords, &state.translation.professional_terms);
        let gate = HardRequirementGate::from_config(&self.gate).with_description(&state.session.description);
        let gated = gate.guard_batch(candidates, &strict, &relaxed, &state.translation.avoid_terms);
        state.stats.gated = gated.papers.len();
        state.stats.gate_rejected = gated.rejected;
        state.stats.gate_fallback = gated.fallback_used;
        self.advance(state, PipelineStage::Gated, format!("{} papers passed the gate", gated.papers.len()), gated.papers.len())
            .await?;

        // ── 3. Initial scoring (strict) ──────────────────────────────────────
        let report = self.scorer.score_all(id, &gated.papers, &state.intent, ScoringMode::Strict).await?;
        self.persist_scores(&report.scores).await?;
        state.stats.initial_scored = report.scores.len();
        self.advance(state, PipelineStage::ScoredInitial, format!("Scored {} papers", report.scores.len()), report.scores.len())
            .await?;

        // ── 4. Seed selection ────────────────────────────────────────────────
        let (tier5, tier4) = select_seeds(&gated.papers, &report.scores);
        state.stats.tier5_seeds = tier5.len();
        state.stats.tier4_seeds = tier4.len();
        let seed_count = tier5.len() + tier4.len();
        self.advance(
            state,
            PipelineStage::SeedsSelected,
            format!("Selected {} priority-5 and {} priority-4 seeds", tier5.len(), tier4.len()),
            seed_count,
        )
        .await?;

        match (&self.graph_source, depth, seed_count) {
            (Some(source), d, n) if d > 0 && n > 0 => {
                // ── 5. Expansion ─────────────────────────────────────────────
                let discovered = self.expand(state, source.clone(), &tier5, &tier4, depth, &queries).await;
                state.stats.expanded_papers = discovered.len();
                self.advance(
                    state,
                    PipelineStage::Expanded,
                    format!("Citation expansion found {} new papers", discovered.len()),
                    discovered.len(),
                )
                .await?;

                // ── 6. Expanded scoring (lenient) ────────────────────────────
                if !discovered.is_empty() {
                    let gated = gate.guard_batch(discovered, &strict, &relaxed, &state.translation.avoid_terms);
                    let report = self.scorer.score_all(id, &gated.papers, &state.intent, ScoringMode::Lenient).await?;
                    self.persist_scores(&report.scores).await?;
                    state.stats.expanded_scored = report.scores.len();
                    state.stats.failed_batches = report.failed_batches;
                }
                let scored = state.stats.expanded_scored;
                self.advance(state, PipelineStage::ScoredExpanded, format!("Scored {scored} expanded papers"), scored)
                    .await?;
            }
            (None, d, n) if d > 0 && n > 0 => {
                info!(session = %id, "No graph-capable source registered, skipping expansion");
            }
            _ => info!(session = %id, depth, seeds = seed_count, "Skipping citation expansion"),
        }

        // ── 7. Consolidation ─────────────────────────────────────────────────
        let min_priority = self.search.min_priority_threshold.max(MIN_VISIBLE_PRIORITY);
        let ranked = self.store.scored_papers(id, min_priority).await?;
        state.papers = consolidate(ranked);
        let relevant = state.papers.len();
        self.advance(state, PipelineStage::Consolidated, format!("{relevant} relevant papers after consolidation"), relevant)
            .await?;

        // ── 8. Relationship classification ───────────────────────────────────
        let ids: Vec<String> = state.papers.iter().map(|r| r.paper.id.clone()).collect();
        if let Some(classifier) = &self.classifier {
            state.stats.relationships_classified = self.classify(state, classifier, &ids).await;
        }
        state.relationships = self.store.relationships_among(&ids).await?;

        // ── 9. Complete ──────────────────────────────────────────────────────
        self.complete(state).await
    }

    async fn complete(&self, state: &mut RunState) -> Result<(), PipelineError> {
        let total = state.all_papers.len();
        let relevant = state.papers.len();
        state.session.translation = Some(state.translation.clone());
        state.session.complete(total, relevant)?;
        self.store.update_session(&state.session).await?;
        self.events.emit(
            state.session.id,
            PipelineStage::Completed,
            format!("Search complete: {relevant} relevant of {total} papers"),
            relevant,
        );
        Ok(())
    }

    async fn persist_scores(&self, scores: &[Score]) -> Result<(), PipelineError> {
        for score in scores {
            self.store.upsert_score(score).await?;
        }
        Ok(())
    }

    /// Run both tier expansions with separate budgets. Each run skips papers
    /// already seen, so tier 4 spends nothing on tier-5 finds. Returns the
    /// papers not seen before this stage. Store failures here are not fatal.
    async fn expand(
        &self,
        state: &mut RunState,
        source: Arc<dyn PaperSource>,
        tier5: &[Paper],
        tier4: &[Paper],
        depth: usize,
        queries: &[SearchQuery],
    ) -> Vec<Paper> {
        let expander = CitationExpander::new(source).with_call_timeout(self.expander_timeout);
        let query_texts: Vec<String> = queries.iter().map(|q| q.text.clone()).collect();
        let year_from = self.search.year_from;
        let runs = [
            (tier5, ExpansionBudget::tier5(&self.expansion, depth, year_from)),
            (tier4, ExpansionBudget::tier4(&self.expansion, depth, year_from)),
        ];

        let mut discovered = Vec::new();
        for (seeds, budget) in runs {
            if seeds.is_empty() {
                continue;
            }
            let expansion = expander.expand_excluding(seeds, &query_texts, &budget, &state.seen).await;
            state.stats.budget_exhausted |= expansion.stats.budget_exhausted;
            state.errors.extend(expansion.errors.iter().cloned());

            let fresh = state.absorb(expansion.discovered());
            if let Err(e) = self.store.upsert_papers(&fresh).await {
                warn!(error = %e, "Failed to store expanded papers");
                state.errors.push(format!("store: {e}"));
            }
            if let Err(e) = self.store.upsert_relationships(&expansion.relationships).await {
                warn!(error = %e, "Failed to store relationships");
                state.errors.push(format!("store: {e}"));
            }
            discovered.extend(fresh);
        }
        discovered
    }

    /// Type up to `max_relationship_analyses` stored edges among the final
    /// papers. Returns how many were classified.
    async fn classify(&self, state: &mut RunState, classifier: &RelationshipClassifier, ids: &[String]) -> usize {
        let rels = match self.store.relationships_among(ids).await {
            Ok(rels) => rels,
            Err(e) => {
                warn!(error = %e, "Could not load relationships for classification");
                state.errors.push(format!("store: {e}"));
                return 0;
            }
        };
        let by_id: HashMap<&str, &Paper> = state.papers.iter().map(|r| (r.paper.id.as_str(), &r.paper)).collect();

        let mut classified = Vec::new();
        for mut rel in rels.into_iter().take(self.max_relationship_analyses) {
            let (Some(citing), Some(cited)) =
                (by_id.get(rel.source_paper_id.as_str()), by_id.get(rel.target_paper_id.as_str()))
            else {
                continue;
            };
            let c = classifier.classify(citing, cited).await;
            rel.relationship_type = c.relationship_type;
            rel.description = Some(c.description);
            classified.push(rel);
        }

        match self.store.upsert_relationships(&classified).await {
            Ok(n) => {
                info!(classified = n, "Relationships classified");
                n
            }
            Err(e) => {
                warn!(error = %e, "Failed to store classified relationships");
                state.errors.push(format!("store: {e}"));
                0
            }
        }
    }
}

/// Translation queries, or the raw keywords when translation produced none.
fn search_queries(translation: &Translation, keywords: &str) -> Vec<SearchQuery> {
    if !translation.query_combinations.is_empty() {
        return translation.query_combinations.clone();
    }
    let keywords = keywords.trim();
    if keywords.is_empty() {
        Vec::new()
    } else {
        vec![SearchQuery::new(keywords, "Raw keywords")]
    }
}

/// Priority-5 and priority-4 seeds, in scoring order.
fn select_seeds(papers: &[Paper], scores: &[Score]) -> (Vec<Paper>, Vec<Paper>) {
    let by_id: HashMap<&str, u8> = scores.iter().map(|s| (s.paper_id.as_str(), s.priority)).collect();
    let mut tier5 = Vec::new();
    let mut tier4 = Vec::new();
    for paper in papers {
        match by_id.get(paper.id.as_str()) {
            Some(5) => tier5.push(paper.clone()),
            Some(4) => tier4.push(paper.clone()),
            _ => {}
        }
    }
    (tier5, tier4)
}

/// Drop title/year duplicates (first wins), then order by priority and
/// citations, both descending. The sort is stable.
pub fn consolidate(ranked: Vec<RankedPaper>) -> Vec<RankedPaper> {
    let mut seen = HashSet::new();
    let mut out: Vec<RankedPaper> = ranked.into_iter().filter(|r| seen.insert(title_year_key(&r.paper))).collect();
    out.sort_by(|a, b| {
        b.priority()
            .cmp(&a.priority())
            .then_with(|| b.paper.citation_count.cmp(&a.paper.citation_count))
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn ranked(id: &str, title: &str, year: Option<i32>, priority: u8, citations: u32) -> RankedPaper {
        let mut paper = Paper::new(id, title);
        paper.year = year;
        paper.citation_count = citations;
        RankedPaper { paper, score: Score::new(Uuid::nil(), id, priority) }
    }

    #[test]
    fn test_consolidate_dedups_by_title_and_year() {
        let out = consolidate(vec![
            ranked("a", "Rail Twins", Some(2020), 5, 10),
            ranked("b", "  rail twins ", Some(2020), 5, 99),
            ranked("c", "Rail Twins", Some(2021), 4, 1),
            ranked("d", "", Some(2020), 4, 3),
            ranked("e", "", Some(2020), 4, 2),
        ]);
        let ids: Vec<_> = out.iter().map(|r| r.paper.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d", "e", "c"]);
    }

    #[test]
    fn test_consolidate_sorts_stably() {
        let out = consolidate(vec![
            ranked("x", "X", None, 4, 5),
            ranked("y", "Y", None, 5, 1),
            ranked("z", "Z", None, 4, 5),
        ]);
        let ids: Vec<_> = out.iter().map(|r| r.paper.id.as_str()).collect();
        assert_eq!(ids, vec!["y", "x", "z"]);
    }

    #[test]
    fn test_select_seeds_by_priority() {
        let papers = vec![Paper::new("a", "A"), Paper::new("b", "B"), Paper::new("c", "C"), Paper::new("d", "D")];
        let scores = vec![
            Score::new(Uuid::nil(), "a", 4),
            Score::new(Uuid::nil(), "b", 5),
            Score::new(Uuid::nil(), "c", 3),
            Score::new(Uuid::nil(), "d", 5),
        ];
        let (t5, t4) = select_seeds(&papers, &scores);
        assert_eq!(t5.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), vec!["b", "d"]);
        assert_eq!(t4.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_search_queries_fall_back_to_keywords() {
        let empty = Translation::default();
        assert_eq!(search_queries(&empty, " rail twins ")[0].text, "rail twins");
        assert!(search_queries(&empty, "  ").is_empty());

        let mut t = Translation::default();
        t.query_combinations = vec![SearchQuery::new("digital twin railway", "core")];
        assert_eq!(search_queries(&t, "ignored").len(), 1);
    }
}
