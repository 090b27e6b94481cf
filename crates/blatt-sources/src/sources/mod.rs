//! Bibliographic source clients.

pub mod semantic_scholar;
pub mod arxiv;
pub mod crossref;

use std::sync::Arc;

use async_trait::async_trait;
use blatt_common::{Paper, SourceKind};

use crate::error::SourceError;

pub use arxiv::ArxivClient;
pub use crossref::CrossRefClient;
pub use semantic_scholar::SemanticScholarClient;

/// Common interface for all bibliographic source clients.
///
/// Exhausted retries and "not found" are reported as empty results, not
/// errors. Errors are reserved for malformed payloads and client faults.
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// Short routing name: "s2", "arxiv" or "crossref".
    fn name(&self) -> &str;

    fn kind(&self) -> SourceKind;

    async fn search(
        &self,
        query: &str,
        limit: usize,
        year_from: Option<i32>,
    ) -> Result<Vec<Paper>, SourceError>;

    /// Papers that cite `paper_id`.
    async fn get_citations(&self, _paper_id: &str, _limit: usize) -> Result<Vec<Paper>, SourceError> {
        Ok(Vec::new())
    }

    /// Papers that `paper_id` cites.
    async fn get_references(&self, _paper_id: &str, _limit: usize) -> Result<Vec<Paper>, SourceError> {
        Ok(Vec::new())
    }

    /// Metadata for a DOI, used to complete missing abstracts.
    async fn lookup_doi(&self, _doi: &str) -> Result<Option<Paper>, SourceError> {
        Ok(None)
    }

    /// Whether citation/reference lookups return real data.
    fn supports_graph(&self) -> bool {
        false
    }
}

/// The configured set of sources, in preference order.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<dyn PaperSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, source: Arc<dyn PaperSource>) -> Self {
        self.register(source);
        self
    }

    /// Later registrations under an existing name replace the earlier one.
    pub fn register(&mut self, source: Arc<dyn PaperSource>) {
        if let Some(slot) = self.sources.iter_mut().find(|s| s.name() == source.name()) {
            *slot = source;
        } else {
            self.sources.push(source);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn PaperSource>> {
        self.sources.iter().find(|s| s.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }

    pub fn all(&self) -> &[Arc<dyn PaperSource>] {
        &self.sources
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// First registered source that can walk the citation graph.
    pub fn graph_source(&self) -> Option<Arc<dyn PaperSource>> {
        self.sources.iter().find(|s| s.supports_graph()).cloned()
    }
}
