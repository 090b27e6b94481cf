//! End-to-end pipeline behaviour against mock sources and a scripted oracle.

use std::collections::HashSet;
use std::sync::Arc;

use blatt_common::config::BlattConfig;
use blatt_common::{Concept, Paper, PipelineStage, SearchSession, SessionStatus};
use blatt_llm::{QueryTranslator, UserIntent};
use blatt_pipeline::scorer::REASON_PARSE_FAILED;
use blatt_pipeline::{
    CitationExpander, ConvergenceController, ExpansionBudget, HardRequirementGate, RunOptions, Scorer, ScoringMode,
    SearchOutcome,
};
use blatt_sources::{CandidateAggregator, PaperSource, SourceRegistry};
use blatt_store::{PaperStore, SqliteStore};
use blatt_test_utils::{paper, MockSource, ScriptedOracle};
use pretty_assertions::assert_eq;

const KEYWORDS: &str = "railway digital twin";

fn twin(id: &str, citations: u32) -> Paper {
    paper(id, &format!("Railway digital twin study {id}")).citations(citations).build()
}

fn off_topic(id: &str, citations: u32) -> Paper {
    paper(id, &format!("Protein folding {id}")).citations(citations).build()
}

fn ids(papers: &[Paper]) -> Vec<&str> {
    papers.iter().map(|p| p.id.as_str()).collect()
}

struct Harness {
    source: Arc<MockSource>,
    oracle: Arc<ScriptedOracle>,
    store: Arc<SqliteStore>,
    controller: ConvergenceController,
}

fn harness(source: MockSource, oracle: ScriptedOracle, config: BlattConfig) -> Harness {
    let source = Arc::new(source);
    let oracle = Arc::new(oracle);
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let registry = SourceRegistry::new().with(source.clone() as Arc<dyn PaperSource>);
    let aggregator = CandidateAggregator::new(registry).with_abstract_completion(false);
    let controller = ConvergenceController::new(
        Arc::new(aggregator),
        Arc::new(QueryTranslator::new(None)),
        Arc::new(Scorer::new(oracle.clone())),
        store.clone() as Arc<dyn PaperStore>,
        &config,
    );
    Harness { source, oracle, store, controller }
}

async fn run(h: &Harness) -> SearchOutcome {
    h.controller.run(SearchSession::new(KEYWORDS, "")).await
}

// ── Expander ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_scenario_a_budget_split_across_seeds() {
    let source = MockSource::new("s2")
        .with_citations(
            "P1",
            vec![twin("m1", 10), off_topic("x1", 500), twin("m2", 30), off_topic("x2", 400), twin("m3", 20)],
        )
        .with_citations("P2", vec![twin("n1", 5), twin("n2", 7)]);
    let source = Arc::new(source);
    let expander = CitationExpander::new(source.clone());
    let budget = ExpansionBudget { depth: 1, per_paper_limit: 2, global_limit: 3, ..ExpansionBudget::default() };

    let out = expander
        .expand(&[twin("P1", 0), twin("P2", 0)], &["railway twin".to_string()], &budget)
        .await;

    // Top two matching citers of P1 by citations, then one slot left for P2.
    assert_eq!(ids(out.discovered()), vec!["m2", "m3", "n2"]);
    assert_eq!(out.stats.new_papers, 3);
    assert!(out.stats.budget_exhausted);
    assert_eq!(out.stats.seed_papers, 2);
    assert_eq!(source.calls(), vec!["citations:P1", "references:P1", "citations:P2"]);
    let edges: Vec<_> = out.relationships.iter().map(|r| r.key()).collect();
    assert_eq!(edges, vec![("m2", "P1"), ("m3", "P1"), ("n2", "P2")]);
}

#[tokio::test]
async fn test_expansion_budget_invariants() {
    let citing: Vec<Paper> = (0..20).map(|i| twin(&format!("c{i}"), i)).collect();
    let cited: Vec<Paper> = (0..20).map(|i| twin(&format!("r{i}"), i)).collect();
    let mut source = MockSource::new("s2");
    for seed in ["S1", "S2", "S3"] {
        let tag = |p: &Paper| {
            let mut p = p.clone();
            p.id = format!("{seed}-{}", p.id);
            p
        };
        source = source
            .with_citations(seed, citing.iter().map(tag).collect())
            .with_references(seed, cited.iter().map(tag).collect());
    }
    let expander = CitationExpander::new(Arc::new(source));
    let budget = ExpansionBudget { depth: 1, per_paper_limit: 4, global_limit: 20, ..ExpansionBudget::default() };

    let out = expander
        .expand(&[twin("S1", 0), twin("S2", 0), twin("S3", 0)], &["digital twin".to_string()], &budget)
        .await;

    assert!(out.stats.new_papers <= 20);
    for seed in ["S1", "S2", "S3"] {
        let citers = out.relationships.iter().filter(|r| r.target_paper_id == seed).count();
        let refs = out.relationships.iter().filter(|r| r.source_paper_id == seed).count();
        assert!(citers <= 4 && refs <= 4, "{seed}: {citers} citers, {refs} references");
    }
    assert_eq!(out.stats.new_papers, 20);
}

#[tokio::test]
async fn test_expansion_records_edges_to_known_papers() {
    // A citing paper that is also a seed is not re-added, but the edge is kept.
    let source = MockSource::new("s2").with_citations("S1", vec![twin("S2", 3)]);
    let expander = CitationExpander::new(Arc::new(source));
    let out = expander
        .expand(&[twin("S1", 0), twin("S2", 0)], &[KEYWORDS.to_string()], &ExpansionBudget::default())
        .await;
    assert_eq!(out.stats.new_papers, 0);
    assert_eq!(out.relationships.len(), 1);
    assert_eq!(out.relationships[0].key(), ("S2", "S1"));
}

#[tokio::test]
async fn test_known_papers_do_not_spend_budget() {
    // "hot" was already found by the tier-5 run; the single slot goes to "fresh".
    let source = MockSource::new("s2").with_citations("S4", vec![twin("hot", 90), twin("fresh", 10)]);
    let expander = CitationExpander::new(Arc::new(source));
    let budget = ExpansionBudget { depth: 1, per_paper_limit: 5, global_limit: 1, ..ExpansionBudget::default() };
    let known: HashSet<String> = ["hot".to_string()].into();

    let out = expander.expand_excluding(&[twin("S4", 0)], &[KEYWORDS.to_string()], &budget, &known).await;
    assert_eq!(ids(out.discovered()), vec!["fresh"]);
    let edges: Vec<_> = out.relationships.iter().map(|r| r.key()).collect();
    assert_eq!(edges, vec![("hot", "S4"), ("fresh", "S4")]);
}

#[tokio::test]
async fn test_known_seed_is_still_expanded() {
    let source = MockSource::new("s2").with_citations("S1", vec![twin("c1", 4)]);
    let expander = CitationExpander::new(Arc::new(source));
    let known: HashSet<String> = ["S1".to_string()].into();
    let out = expander
        .expand_excluding(&[twin("S1", 0)], &[KEYWORDS.to_string()], &ExpansionBudget::default(), &known)
        .await;
    assert_eq!(ids(out.discovered()), vec!["c1"]);
    assert_eq!(out.stats.seed_papers, 1);
}

#[tokio::test]
async fn test_expansion_year_and_citation_filters() {
    let old = paper("old", "Railway digital twin origins").year(2001).citations(90).build();
    let undated = paper("undated", "Railway digital twin notes").citations(80).build();
    let obscure = paper("obscure", "Railway digital twin draft").year(2022).citations(1).build();
    let source = MockSource::new("s2").with_citations("S1", vec![old, undated, obscure]);
    let expander = CitationExpander::new(Arc::new(source));
    let budget = ExpansionBudget { year_from: Some(2015), min_citation_count: 5, ..ExpansionBudget::default() };

    let out = expander.expand(&[twin("S1", 0)], &[KEYWORDS.to_string()], &budget).await;
    assert_eq!(ids(out.discovered()), vec!["undated"]);
}

#[tokio::test]
async fn test_expansion_skips_failing_source() {
    let source = MockSource::new("s2").failing_graph("boom");
    let expander = CitationExpander::new(Arc::new(source));
    let out = expander.expand(&[twin("S1", 0)], &[KEYWORDS.to_string()], &ExpansionBudget::default()).await;
    assert_eq!(out.stats.new_papers, 0);
    assert_eq!(out.errors.len(), 2);
    assert_eq!(out.stats.rounds_completed, 1);
}

// ── Gate ──────────────────────────────────────────────────────────────────────

#[test]
fn test_scenario_c_avoid_term_rejects() {
    let gate = HardRequirementGate::new(0.6, 1);
    let papers = vec![
        paper("a", "Autonomous automotive navigation").build(),
        paper("b", "Autonomous rail navigation").build(),
    ];
    let concepts = vec![Concept::from_phrase("autonomous"), Concept::from_phrase("navigation")];
    let out = gate.guard_batch(papers, &concepts, &[], &["automotive".to_string()]);
    assert_eq!(ids(&out.papers), vec!["b"]);
    assert_eq!(out.rejected, 1);
    assert!(!out.fallback_used);
    assert_eq!(out.verdicts["a"].reason, "Contains excluded term: automotive");
}

#[test]
fn test_gate_never_starves_the_oracle() {
    let gate = HardRequirementGate::new(0.6, 30);
    let papers: Vec<Paper> = (0..5)
        .map(|i| paper(&format!("p{i}"), &format!("Automotive rail twin {i}")).build())
        .collect();
    let out = gate.guard_batch(papers.clone(), &[Concept::from_phrase("rail")], &[], &["automotive".to_string()]);
    assert!(out.fallback_used);
    assert_eq!(out.papers, papers);
}

// ── Scoring ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_scenario_b_lenient_batch_defaults() {
    let papers: Vec<Paper> = (0..4).map(|i| twin(&format!("p{i}"), 1)).collect();
    let scorer = Scorer::new(Arc::new(ScriptedOracle::new().with("p0", 5).poison("p2")));
    let report = scorer
        .score_all(uuid::Uuid::new_v4(), &papers, &UserIntent::new(KEYWORDS, ""), ScoringMode::Lenient)
        .await
        .unwrap();
    assert_eq!(report.failed_batches, 1);
    assert!(report.scores.iter().all(|s| s.priority == 3 && s.reason == REASON_PARSE_FAILED));
}

// ── Controller ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_full_run_expands_and_consolidates() {
    let source = MockSource::new("s2")
        .with_default_results(vec![twin("p1", 50), twin("p2", 30), twin("p3", 100), twin("p4", 1)])
        .with_citations("p1", vec![twin("c1", 9), twin("c2", 8), off_topic("x", 999)])
        .with_references("p2", vec![twin("r1", 40)]);
    let oracle = ScriptedOracle::new()
        .with("p1", 5)
        .with("p2", 4)
        .with("p4", 2)
        .with("c1", 5)
        .with("r1", 4);
    let h = harness(source, oracle, BlattConfig::default());

    let out = run(&h).await;

    assert!(out.is_completed(), "errors: {:?}", out.errors);
    let ranked: Vec<_> = out.papers.iter().map(|r| (r.paper.id.as_str(), r.priority())).collect();
    assert_eq!(ranked, vec![("p1", 5), ("c1", 5), ("r1", 4), ("p2", 4)]);
    assert_eq!(out.session.total_papers, 7);
    assert_eq!(out.session.relevant_papers, 4);
    assert_eq!(out.stats.tier5_seeds, 1);
    assert_eq!(out.stats.tier4_seeds, 1);
    assert_eq!(out.stats.expanded_papers, 3);

    let mut edges: Vec<_> = out.relationships.iter().map(|r| r.key()).collect();
    edges.sort();
    assert_eq!(edges, vec![("c1", "p1"), ("p2", "r1")]);

    // Expanded papers are scored in their own pass.
    let batches = h.oracle.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1], vec!["c1", "c2", "r1"]);

    let stored = h.store.get_session(out.session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.relevant_papers, 4);
    assert!(stored.translation.unwrap().fallback);
}

#[tokio::test]
async fn test_consolidated_output_has_no_low_priorities() {
    let mut config = BlattConfig::default();
    config.search.min_priority_threshold = 1;
    let source = MockSource::new("s2").with_default_results((0..6).map(|i| twin(&format!("p{i}"), i)).collect());
    let oracle = ScriptedOracle::new().with("p0", 1).with("p1", 2).with("p2", 3).with("p3", 4).with("p4", 5);
    let h = harness(source, oracle, config);

    let out = run(&h).await;
    assert!(out.is_completed());
    assert!(out.papers.iter().all(|r| r.priority() >= 4));
    assert_eq!(out.papers.len(), 2);
}

#[tokio::test]
async fn test_scenario_b_strict_initial_failure_fails_session() {
    let source = MockSource::new("s2").with_default_results((0..4).map(|i| twin(&format!("p{i}"), 1)).collect());
    let h = harness(source, ScriptedOracle::new().poison("p1"), BlattConfig::default());

    let out = run(&h).await;

    assert_eq!(out.session.status, SessionStatus::Failed);
    assert_eq!(out.session.stage, PipelineStage::Failed);
    assert!(out.session.error.as_deref().unwrap_or_default().starts_with("Initial scoring failed"));
    assert!(out.papers.is_empty());

    let stored = h.store.get_session(out.session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Failed);
    // Candidates written before the failure stay in the store.
    assert!(h.store.get_paper("p0").await.unwrap().is_some());
}

#[tokio::test]
async fn test_scenario_b_expanded_failure_still_completes() {
    let source = MockSource::new("s2")
        .with_default_results(vec![twin("p1", 10)])
        .with_citations("p1", (0..4).map(|i| twin(&format!("c{i}"), i)).collect());
    let h = harness(source, ScriptedOracle::new().with("p1", 5).poison("c0"), BlattConfig::default());

    let out = run(&h).await;

    assert!(out.is_completed());
    assert_eq!(out.stats.failed_batches, 1);
    assert_eq!(out.stats.expanded_scored, 4);
    assert_eq!(out.papers.len(), 1);
    let all = h.store.scored_papers(out.session.id, 1).await.unwrap();
    let defaulted: Vec<_> = all.iter().filter(|r| r.score.reason == REASON_PARSE_FAILED).collect();
    assert_eq!(defaulted.len(), 4);
    assert!(defaulted.iter().all(|r| r.priority() == 3));
}

#[tokio::test]
async fn test_zero_candidates_completes_empty() {
    let h = harness(MockSource::new("s2"), ScriptedOracle::new(), BlattConfig::default());

    let out = run(&h).await;

    assert_eq!(out.session.status, SessionStatus::Completed);
    assert_eq!(out.session.total_papers, 0);
    assert_eq!(out.session.relevant_papers, 0);
    assert!(out.session.error.is_none());
    assert!(h.oracle.batches().is_empty());
}

#[tokio::test]
async fn test_depth_zero_skips_expansion() {
    let source = MockSource::new("s2")
        .with_default_results(vec![twin("p1", 10)])
        .with_citations("p1", vec![twin("c1", 1)]);
    let h = harness(source, ScriptedOracle::new().with("p1", 5), BlattConfig::default());

    let out = h
        .controller
        .run_with(SearchSession::new(KEYWORDS, ""), RunOptions { citation_depth: Some(0), ..RunOptions::default() })
        .await;

    assert!(out.is_completed());
    assert!(h.source.calls().iter().all(|c| c.starts_with("search:")));
    assert_eq!(out.session.total_papers, 1);
}

#[tokio::test]
async fn test_source_failure_is_not_fatal() {
    let h = harness(MockSource::new("s2").failing_search("503"), ScriptedOracle::new(), BlattConfig::default());
    let out = run(&h).await;
    assert!(out.is_completed());
    assert_eq!(out.errors.len(), 1);
    assert!(out.errors[0].starts_with("s2:"));
}

#[tokio::test]
async fn test_stage_events_are_broadcast() {
    let (tx, mut rx) = tokio::sync::broadcast::channel(64);
    let source = MockSource::new("s2").with_default_results(vec![twin("p1", 10)]);
    let mut h = harness(source, ScriptedOracle::new().with("p1", 4), BlattConfig::default());
    h.controller = h.controller.with_events(tx);

    let out = run(&h).await;

    let mut stages = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        assert_eq!(ev.session_id, out.session.id);
        stages.push(ev.stage);
    }
    assert_eq!(
        stages,
        vec![
            PipelineStage::Initiated,
            PipelineStage::Searched,
            PipelineStage::Gated,
            PipelineStage::ScoredInitial,
            PipelineStage::SeedsSelected,
            PipelineStage::Expanded,
            PipelineStage::ScoredExpanded,
            PipelineStage::Consolidated,
            PipelineStage::Completed,
        ]
    );
}
