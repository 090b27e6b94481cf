//! Citation Graph Expander.
//!
//! Walks citations and references outward from seed papers, keeping only
//! neighbours that match one of the session's queries, under a per-paper
//! and a global budget.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use blatt_common::config::ExpansionConfig;
use blatt_common::{Paper, Relationship};
use blatt_sources::PaperSource;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

const QUERY_STOPWORDS: &[&str] = &["for", "and", "or", "in", "on", "at", "to", "the", "a", "an", "of", "with", "by"];

#[derive(Debug, Clone, PartialEq)]
pub struct ExpansionBudget {
    pub depth: usize,
    pub per_paper_limit: usize,
    pub global_limit: usize,
    /// Neighbours requested per side before filtering.
    pub oversample: usize,
    pub year_from: Option<i32>,
    pub min_citation_count: u32,
}

impl Default for ExpansionBudget {
    fn default() -> Self {
        Self {
            depth: 1,
            per_paper_limit: 10,
            global_limit: 200,
            oversample: 100,
            year_from: None,
            min_citation_count: 0,
        }
    }
}

impl ExpansionBudget {
    /// Budget for expanding from priority-5 seeds.
    pub fn tier5(cfg: &ExpansionConfig, depth: usize, year_from: Option<i32>) -> Self {
        Self::from_parts(cfg, cfg.tier5_per_paper, cfg.tier5_global, depth, year_from)
    }

    /// Budget for expanding from priority-4 seeds.
    pub fn tier4(cfg: &ExpansionConfig, depth: usize, year_from: Option<i32>) -> Self {
        Self::from_parts(cfg, cfg.tier4_per_paper, cfg.tier4_global, depth, year_from)
    }

    fn from_parts(
        cfg: &ExpansionConfig,
        per_paper_limit: usize,
        global_limit: usize,
        depth: usize,
        year_from: Option<i32>,
    ) -> Self {
        Self {
            depth,
            per_paper_limit,
            global_limit,
            oversample: cfg.oversample,
            year_from,
            min_citation_count: cfg.min_citation_count,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExpansionStats {
    pub total_papers: usize,
    pub total_relationships: usize,
    pub seed_papers: usize,
    pub queries_used: usize,
    pub new_papers: usize,
    pub budget_exhausted: bool,
    pub rounds_completed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Expansion {
    /// Seeds first, then discovered papers in discovery order.
    pub papers: Vec<Paper>,
    pub relationships: Vec<Relationship>,
    pub stats: ExpansionStats,
    pub errors: Vec<String>,
}

impl Expansion {
    /// Papers found by this expansion, excluding the seeds.
    pub fn discovered(&self) -> &[Paper] {
        &self.papers[self.stats.seed_papers.min(self.papers.len())..]
    }
}

/// Lower-cased query tokens with stopwords removed.
pub fn query_tokens(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|w| !QUERY_STOPWORDS.contains(w))
        .map(String::from)
        .collect()
}

/// True when every token of at least one query occurs in the paper text.
/// A query without tokens matches nothing.
pub fn matches_any_query(paper: &Paper, queries: &[Vec<String>]) -> bool {
    let text = paper.text();
    queries
        .iter()
        .any(|tokens| !tokens.is_empty() && tokens.iter().all(|t| text.contains(t.as_str())))
}

#[derive(Clone, Copy)]
enum Side {
    Citations,
    References,
}

impl Side {
    fn as_str(&self) -> &'static str {
        match self {
            Side::Citations => "citations",
            Side::References => "references",
        }
    }
}

/// Running state of one expansion.
struct Walk {
    papers: Vec<Paper>,
    seen: HashSet<String>,
    edges: Vec<Relationship>,
    edge_index: HashMap<(String, String), usize>,
    remaining: usize,
    exhausted: bool,
    errors: Vec<String>,
}

impl Walk {
    fn record_edge(&mut self, rel: Relationship) {
        let key = (rel.source_paper_id.clone(), rel.target_paper_id.clone());
        match self.edge_index.get(&key) {
            Some(&i) => self.edges[i] = rel,
            None => {
                self.edge_index.insert(key, self.edges.len());
                self.edges.push(rel);
            }
        }
    }
}

pub struct CitationExpander {
    source: Arc<dyn PaperSource>,
    call_timeout: Duration,
}

impl CitationExpander {
    pub fn new(source: Arc<dyn PaperSource>) -> Self {
        Self { source, call_timeout: Duration::from_secs(60) }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub async fn expand(&self, seeds: &[Paper], queries: &[String], budget: &ExpansionBudget) -> Expansion {
        self.expand_excluding(seeds, queries, budget, &HashSet::new()).await
    }

    /// Like [`expand`](Self::expand), but neighbours already in `known` are
    /// not added and do not count against the global budget. Their edges are
    /// still recorded.
    #[instrument(
        skip(self, seeds, queries, budget, known),
        fields(source = self.source.name(), seeds = seeds.len(), known = known.len())
    )]
    pub async fn expand_excluding(
        &self,
        seeds: &[Paper],
        queries: &[String],
        budget: &ExpansionBudget,
        known: &HashSet<String>,
    ) -> Expansion {
        let tokens: Vec<Vec<String>> = queries.iter().map(|q| query_tokens(q)).collect();
        let mut walk = Walk {
            papers: Vec::new(),
            seen: HashSet::new(),
            edges: Vec::new(),
            edge_index: HashMap::new(),
            remaining: budget.global_limit,
            exhausted: false,
            errors: Vec::new(),
        };
        for seed in seeds {
            if walk.seen.insert(seed.id.clone()) {
                walk.papers.push(seed.clone());
            }
        }
        let seed_count = walk.papers.len();
        walk.seen.extend(known.iter().cloned());

        info!(
            seeds = seed_count,
            queries = queries.len(),
            per_paper = budget.per_paper_limit,
            global = budget.global_limit,
            "Starting citation expansion"
        );

        let mut level: Vec<Paper> = walk.papers.clone();
        let mut rounds = 0;
        for round in 0..budget.depth {
            let mut next_level = Vec::new();
            for paper in &level {
                if walk.remaining == 0 {
                    walk.exhausted = true;
                    info!(round, global = budget.global_limit, "Global budget exhausted, stopping round");
                    break;
                }
                self.expand_side(&mut walk, &mut next_level, paper, Side::Citations, &tokens, budget).await;
                if walk.remaining > 0 {
                    self.expand_side(&mut walk, &mut next_level, paper, Side::References, &tokens, budget).await;
                }
            }
            rounds += 1;
            debug!(round, added = next_level.len(), total = walk.papers.len(), "Expansion round complete");
            if next_level.is_empty() || walk.exhausted {
                break;
            }
            level = next_level;
        }

        let new_papers = walk.papers.len() - seed_count;
        let stats = ExpansionStats {
            total_papers: walk.papers.len(),
            total_relationships: walk.edges.len(),
            seed_papers: seed_count,
            queries_used: queries.len(),
            new_papers,
            budget_exhausted: walk.exhausted,
            rounds_completed: rounds,
        };
        info!(
            new_papers,
            relationships = stats.total_relationships,
            budget_exhausted = stats.budget_exhausted,
            "Citation expansion complete"
        );
        Expansion { papers: walk.papers, relationships: walk.edges, stats, errors: walk.errors }
    }

    async fn expand_side(
        &self,
        walk: &mut Walk,
        next_level: &mut Vec<Paper>,
        seed: &Paper,
        side: Side,
        tokens: &[Vec<String>],
        budget: &ExpansionBudget,
    ) {
        let call = match side {
            Side::Citations => self.source.get_citations(&seed.id, budget.oversample),
            Side::References => self.source.get_references(&seed.id, budget.oversample),
        };
        let raw = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(papers)) => papers,
            Ok(Err(e)) => {
                warn!(paper = %seed.id, side = side.as_str(), error = %e, "Graph lookup failed, skipping");
                walk.errors.push(format!("{} {}: {e}", side.as_str(), seed.id));
                return;
            }
            Err(_) => {
                warn!(paper = %seed.id, side = side.as_str(), "Graph lookup timed out, skipping");
                walk.errors.push(format!("{} {}: timed out", side.as_str(), seed.id));
                return;
            }
        };

        let candidates = raw.len();
        let mut matched: Vec<Paper> = raw.into_iter().filter(|p| matches_any_query(p, tokens)).collect();
        matched.sort_by(|a, b| b.citation_count.cmp(&a.citation_count));
        matched.truncate(budget.per_paper_limit);
        debug!(paper = %seed.id, side = side.as_str(), candidates, matched = matched.len(), "Neighbours filtered");

        for neighbour in matched {
            if walk.remaining == 0 {
                walk.exhausted = true;
                break;
            }
            if budget.year_from.is_some_and(|from| neighbour.year.is_some_and(|y| y < from)) {
                continue;
            }
            if neighbour.citation_count < budget.min_citation_count {
                continue;
            }

            let edge = match side {
                Side::Citations => Relationship::cites(&neighbour.id, &seed.id),
                Side::References => Relationship::cites(&seed.id, &neighbour.id),
            };
            if walk.seen.insert(neighbour.id.clone()) {
                walk.remaining -= 1;
                walk.papers.push(neighbour.clone());
                next_level.push(neighbour);
            }
            walk.record_edge(edge);
        }
    }
}
