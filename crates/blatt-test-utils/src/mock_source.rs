//! Scripted `PaperSource`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use blatt_common::{Paper, SourceKind};
use blatt_sources::{PaperSource, SourceError};

/// Replays canned search results and citation edges.
///
/// Unscripted queries return `default_results`. Every call is appended to
/// `calls()` as `"search:<query>"`, `"citations:<id>"`, `"references:<id>"`
/// or `"doi:<doi>"`.
pub struct MockSource {
    name: String,
    kind: SourceKind,
    searches: HashMap<String, Vec<Paper>>,
    default_results: Vec<Paper>,
    citations: HashMap<String, Vec<Paper>>,
    references: HashMap<String, Vec<Paper>>,
    dois: HashMap<String, Paper>,
    fail_search: Option<String>,
    fail_graph: Option<String>,
    delay: Option<Duration>,
    graph: bool,
    calls: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: SourceKind::parse(name),
            searches: HashMap::new(),
            default_results: Vec::new(),
            citations: HashMap::new(),
            references: HashMap::new(),
            dois: HashMap::new(),
            fail_search: None,
            fail_graph: None,
            delay: None,
            graph: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_search(mut self, query: &str, papers: Vec<Paper>) -> Self {
        self.searches.insert(query.to_string(), papers);
        self
    }

    pub fn with_default_results(mut self, papers: Vec<Paper>) -> Self {
        self.default_results = papers;
        self
    }

    pub fn with_citations(mut self, paper_id: &str, citing: Vec<Paper>) -> Self {
        self.citations.insert(paper_id.to_string(), citing);
        self
    }

    pub fn with_references(mut self, paper_id: &str, cited: Vec<Paper>) -> Self {
        self.references.insert(paper_id.to_string(), cited);
        self
    }

    pub fn with_doi(mut self, doi: &str, paper: Paper) -> Self {
        self.dois.insert(doi.to_string(), paper);
        self
    }

    /// Every search fails with a parse error carrying `message`.
    pub fn failing_search(mut self, message: &str) -> Self {
        self.fail_search = Some(message.to_string());
        self
    }

    /// Citation and reference lookups fail.
    pub fn failing_graph(mut self, message: &str) -> Self {
        self.fail_graph = Some(message.to_string());
        self
    }

    /// Sleep before answering any call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn without_graph(mut self) -> Self {
        self.graph = false;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn record(&self, call: String) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    async fn pause(&self) {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
    }

    fn graph_side(&self, map: &HashMap<String, Vec<Paper>>, paper_id: &str, limit: usize) -> Result<Vec<Paper>, SourceError> {
        if let Some(msg) = &self.fail_graph {
            return Err(SourceError::parse(&self.name, msg.clone()));
        }
        Ok(map
            .get(paper_id)
            .map(|v| v.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[async_trait]
impl PaperSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn search(&self, query: &str, limit: usize, _year_from: Option<i32>) -> Result<Vec<Paper>, SourceError> {
        self.record(format!("search:{query}"));
        self.pause().await;
        if let Some(msg) = &self.fail_search {
            return Err(SourceError::parse(&self.name, msg.clone()));
        }
        let papers = self.searches.get(query).unwrap_or(&self.default_results);
        Ok(papers.iter().take(limit).cloned().collect())
    }

    async fn get_citations(&self, paper_id: &str, limit: usize) -> Result<Vec<Paper>, SourceError> {
        self.record(format!("citations:{paper_id}"));
        self.pause().await;
        self.graph_side(&self.citations, paper_id, limit)
    }

    async fn get_references(&self, paper_id: &str, limit: usize) -> Result<Vec<Paper>, SourceError> {
        self.record(format!("references:{paper_id}"));
        self.pause().await;
        self.graph_side(&self.references, paper_id, limit)
    }

    async fn lookup_doi(&self, doi: &str) -> Result<Option<Paper>, SourceError> {
        self.record(format!("doi:{doi}"));
        self.pause().await;
        Ok(self.dois.get(doi).cloned())
    }

    fn supports_graph(&self) -> bool {
        self.graph
    }
}
