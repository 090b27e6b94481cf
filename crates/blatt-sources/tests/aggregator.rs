//! Aggregator behaviour against scripted sources.

use std::sync::Arc;
use std::time::Duration;

use blatt_common::SearchQuery;
use blatt_sources::{CandidateAggregator, SourceRegistry};
use blatt_test_utils::{paper, MockSource};
use pretty_assertions::assert_eq;

fn q(text: &str) -> SearchQuery {
    SearchQuery::new(text, "core")
}

#[tokio::test]
async fn test_same_title_and_author_keeps_first_seen() {
    let s2 = MockSource::new("s2").with_default_results(vec![
        paper("s2-abc", "Rail Digital Twins").author("Ada Lovelace").citations(5).build(),
    ]);
    let arxiv = MockSource::new("arxiv").with_default_results(vec![
        paper("arXiv:2101.00001", "  rail   digital twins").author("ada lovelace").citations(50).build(),
    ]);
    let registry = SourceRegistry::new().with(Arc::new(s2)).with(Arc::new(arxiv));

    let agg = CandidateAggregator::new(registry)
        .with_abstract_completion(false)
        .search_with_queries(&[q("rail twins")], 12, 200, None)
        .await;

    assert_eq!(agg.papers.len(), 1);
    assert_eq!(agg.papers[0].id, "s2-abc");
    assert_eq!(agg.papers[0].citation_count, 5);
    assert_eq!(agg.per_source.get("s2"), Some(&1));
    assert_eq!(agg.per_source.get("arxiv"), Some(&0));
}

#[tokio::test]
async fn test_same_title_different_author_is_kept() {
    let s2 = MockSource::new("s2").with_default_results(vec![
        paper("1", "Rail Digital Twins").author("A").build(),
        paper("2", "Rail Digital Twins").author("B").build(),
    ]);
    let agg = CandidateAggregator::new(SourceRegistry::new().with(Arc::new(s2)))
        .search_with_queries(&[q("x")], 12, 200, None)
        .await;
    assert_eq!(agg.papers.len(), 2);
}

#[tokio::test]
async fn test_aggregation_is_deterministic() {
    let build = || {
        let s2 = MockSource::new("s2")
            .with_search("one", vec![
                paper("a", "Alpha").citations(3).build(),
                paper("b", "Beta").citations(9).build(),
            ])
            .with_search("two", vec![
                paper("c", "Gamma").citations(9).build(),
                paper("a2", "alpha").build(),
            ]);
        let crossref = MockSource::new("crossref")
            .with_default_results(vec![paper("DOI:10.1/d", "Delta").citations(1).build()]);
        CandidateAggregator::new(SourceRegistry::new().with(Arc::new(s2)).with(Arc::new(crossref)))
    };
    let queries = [q("one"), q("two")];

    let first = build().search_with_queries(&queries, 12, 200, None).await;
    let second = build().search_with_queries(&queries, 12, 200, None).await;

    let ids = |a: &blatt_sources::Aggregation| a.papers.iter().map(|p| p.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&first), ids(&second));
    // Citation-descending, ties in discovery order.
    assert_eq!(ids(&first), vec!["b", "c", "a", "DOI:10.1/d"]);
}

#[tokio::test]
async fn test_total_limit_short_circuits() {
    let s2 = Arc::new(MockSource::new("s2").with_default_results(
        (0..10).map(|i| paper(&format!("p{i}"), &format!("Paper {i}")).build()).collect(),
    ));
    let arxiv = Arc::new(MockSource::new("arxiv").with_default_results(vec![paper("x", "X").build()]));
    let registry = SourceRegistry::new().with(s2.clone()).with(arxiv.clone());

    let agg = CandidateAggregator::new(registry)
        .search_with_queries(&[q("first"), q("second")], 12, 4, None)
        .await;

    assert_eq!(agg.papers.len(), 4);
    assert_eq!(agg.queries_run, 1);
    assert_eq!(s2.calls(), vec!["search:first"]);
    assert!(arxiv.calls().is_empty());
}

#[tokio::test]
async fn test_failing_source_is_skipped() {
    let s2 = MockSource::new("s2").failing_search("boom");
    let arxiv = MockSource::new("arxiv").with_default_results(vec![paper("arXiv:1", "Only").build()]);
    let registry = SourceRegistry::new().with(Arc::new(s2)).with(Arc::new(arxiv));

    let agg = CandidateAggregator::new(registry)
        .search_with_queries(&[q("anything")], 12, 200, None)
        .await;

    assert_eq!(agg.papers.len(), 1);
    assert_eq!(agg.errors.len(), 1);
    assert!(agg.errors[0].starts_with("s2:"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_source_times_out() {
    let s2 = MockSource::new("s2")
        .with_delay(Duration::from_secs(120))
        .with_default_results(vec![paper("late", "Late").build()]);
    let agg = CandidateAggregator::new(SourceRegistry::new().with(Arc::new(s2)))
        .with_call_timeout(Duration::from_secs(5))
        .search_with_queries(&[q("slow")], 12, 200, None)
        .await;

    assert!(agg.papers.is_empty());
    assert!(agg.errors[0].contains("timed out"));
}

#[tokio::test]
async fn test_explicit_order_restricts_sources() {
    let s2 = Arc::new(MockSource::new("s2").with_default_results(vec![paper("s", "S").build()]));
    let crossref = Arc::new(MockSource::new("crossref").with_default_results(vec![paper("c", "C").build()]));
    let registry = SourceRegistry::new().with(s2.clone()).with(crossref.clone());

    let agg = CandidateAggregator::new(registry)
        .with_explicit_order(vec!["crossref".into()])
        .search_with_queries(&[q("benchmark survey")], 12, 200, None)
        .await;

    assert_eq!(agg.papers.len(), 1);
    assert_eq!(agg.papers[0].id, "c");
    assert!(s2.calls().is_empty());
}

#[tokio::test]
async fn test_missing_abstracts_completed_by_doi() {
    let s2 = MockSource::new("s2").with_default_results(vec![
        paper("DOI:10.1/x", "No Abstract").doi("10.1/x").build(),
        paper("y", "Has Abstract").abstract_text("present").doi("10.1/y").build(),
    ]);
    let crossref = MockSource::new("crossref")
        .with_doi("10.1/x", paper("DOI:10.1/x", "No Abstract").abstract_text("filled in").build());
    let crossref = Arc::new(crossref);
    let registry = SourceRegistry::new().with(Arc::new(s2)).with(crossref.clone());

    let agg = CandidateAggregator::new(registry)
        .with_explicit_order(vec!["s2".into()])
        .search_with_queries(&[q("x")], 12, 200, None)
        .await;

    assert_eq!(agg.abstracts_completed, 1);
    let filled = agg.papers.iter().find(|p| p.id == "DOI:10.1/x").unwrap();
    assert_eq!(filled.abstract_text.as_deref(), Some("filled in"));
    assert_eq!(crossref.calls(), vec!["doi:10.1/x"]);
}
