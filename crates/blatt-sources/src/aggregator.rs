//! Candidate aggregation: fan queries out over the routed sources, dedup,
//! rank by citations.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use blatt_common::config::SourcesConfig;
use blatt_common::{Paper, SearchQuery};
use tracing::{debug, info, instrument, warn};

use crate::dedup::Deduplicator;
use crate::sources::SourceRegistry;

const IMPLEMENTATION_WORDS: &[&str] = &["framework", "dataset", "benchmark", "tool", "platform", "library"];
const SURVEY_WORDS: &[&str] = &["survey", "review", "state-of-the-art", "overview"];

/// Source order for one query when no explicit order is configured.
///
/// Implementation-flavoured queries go to arXiv first (preprints land
/// sooner), surveys to Semantic Scholar first (complete citation data).
pub fn route(query: &SearchQuery) -> [&'static str; 3] {
    let text = query.text.to_lowercase();
    let strategy = query.strategy.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| text.contains(w) || strategy.contains(w));

    if mentions(IMPLEMENTATION_WORDS) {
        ["arxiv", "s2", "crossref"]
    } else if mentions(SURVEY_WORDS) {
        ["s2", "crossref", "arxiv"]
    } else {
        ["s2", "arxiv", "crossref"]
    }
}

/// Result of one aggregation run.
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    pub papers: Vec<Paper>,
    /// Per-source failures, logged and skipped.
    pub errors: Vec<String>,
    pub queries_run: usize,
    /// New (post-dedup) candidates contributed by each source.
    pub per_source: BTreeMap<String, usize>,
    pub abstracts_completed: usize,
    pub duration_ms: u64,
}

pub struct CandidateAggregator {
    registry: SourceRegistry,
    explicit_order: Option<Vec<String>>,
    call_timeout: Duration,
    complete_abstracts: bool,
}

impl CandidateAggregator {
    pub fn new(registry: SourceRegistry) -> Self {
        Self {
            registry,
            explicit_order: None,
            call_timeout: Duration::from_secs(60),
            complete_abstracts: true,
        }
    }

    pub fn from_config(registry: SourceRegistry, config: &SourcesConfig) -> Self {
        Self::new(registry)
            .with_explicit_order(config.enabled.clone())
            .with_call_timeout(Duration::from_secs(config.call_timeout_secs))
            .with_abstract_completion(config.complete_abstracts)
    }

    /// A non-empty list disables dynamic routing.
    pub fn with_explicit_order(mut self, order: Vec<String>) -> Self {
        self.explicit_order = (!order.is_empty()).then_some(order);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_abstract_completion(mut self, enabled: bool) -> Self {
        self.complete_abstracts = enabled;
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    fn order_for(&self, query: &SearchQuery) -> Vec<String> {
        match &self.explicit_order {
            Some(order) => order.clone(),
            None => route(query).iter().map(|s| s.to_string()).collect(),
        }
    }

    #[instrument(skip(self, queries), fields(queries = queries.len()))]
    pub async fn search_with_queries(
        &self,
        queries: &[SearchQuery],
        per_query_limit: usize,
        total_limit: usize,
        year_from: Option<i32>,
    ) -> Aggregation {
        let start = Instant::now();
        let mut agg = Aggregation::default();
        let mut dedup = Deduplicator::new();

        'queries: for query in queries {
            if agg.papers.len() >= total_limit {
                break;
            }
            agg.queries_run += 1;
            let order = self.order_for(query);
            debug!(query = %query.text, strategy = %query.strategy, sources = ?order, "Routing query");

            for name in &order {
                let Some(source) = self.registry.get(name) else {
                    debug!(source = %name, "Source not registered, skipping");
                    continue;
                };

                let call = source.search(&query.text, per_query_limit, year_from);
                let found = match tokio::time::timeout(self.call_timeout, call).await {
                    Ok(Ok(papers)) => papers,
                    Ok(Err(e)) => {
                        warn!(source = %name, error = %e, "Source search failed, skipping");
                        agg.errors.push(format!("{name}: {e}"));
                        continue;
                    }
                    Err(_) => {
                        warn!(source = %name, secs = self.call_timeout.as_secs(), "Source search timed out, skipping");
                        agg.errors.push(format!("{name}: timed out after {}s", self.call_timeout.as_secs()));
                        continue;
                    }
                };

                let mut added = 0usize;
                for paper in found {
                    if dedup.insert(&paper) {
                        agg.papers.push(paper);
                        added += 1;
                        if agg.papers.len() >= total_limit {
                            *agg.per_source.entry(name.clone()).or_default() += added;
                            info!(total_limit, "Reached paper limit, stopping search");
                            break 'queries;
                        }
                    }
                }
                *agg.per_source.entry(name.clone()).or_default() += added;
                debug!(source = %name, added, total = agg.papers.len(), "Source results merged");
            }
        }

        // Stable: equal citation counts keep discovery order.
        agg.papers.sort_by(|a, b| b.citation_count.cmp(&a.citation_count));
        agg.papers.truncate(total_limit);

        if self.complete_abstracts {
            agg.abstracts_completed = self.complete_missing_abstracts(&mut agg.papers).await;
        }

        agg.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            papers = agg.papers.len(),
            queries = agg.queries_run,
            errors = agg.errors.len(),
            abstracts_completed = agg.abstracts_completed,
            "Aggregation complete"
        );
        agg
    }

    /// Fill missing abstracts through `lookup_doi`, trying sources in
    /// registry order. Returns how many were filled.
    async fn complete_missing_abstracts(&self, papers: &mut [Paper]) -> usize {
        let mut completed = 0;
        for paper in papers.iter_mut() {
            if paper.abstract_text.as_deref().is_some_and(|a| !a.trim().is_empty()) {
                continue;
            }
            let Some(doi) = paper.doi.clone() else { continue };

            for source in self.registry.all() {
                let lookup = source.lookup_doi(&doi);
                let found = match tokio::time::timeout(self.call_timeout, lookup).await {
                    Ok(Ok(found)) => found,
                    Ok(Err(e)) => {
                        debug!(source = source.name(), doi = %doi, error = %e, "Abstract lookup failed");
                        continue;
                    }
                    Err(_) => {
                        debug!(source = source.name(), doi = %doi, "Abstract lookup timed out");
                        continue;
                    }
                };
                let abstract_text = found
                    .and_then(|p| p.abstract_text)
                    .filter(|a| !a.trim().is_empty());
                if let Some(a) = abstract_text {
                    paper.abstract_text = Some(a);
                    completed += 1;
                    debug!(paper = %paper.id, source = source.name(), "Abstract completed");
                    break;
                }
            }
        }
        completed
    }
}
