//! Semantic Scholar Graph API client.
//!
//! The only provider with citation and reference lookups, so it also backs
//! graph expansion. Identifiers such as `arXiv:2101.00001` and `DOI:10.x/y`
//! are accepted natively by the API, which lets papers first seen on another
//! provider be expanded too.
//!
//! API: https://api.semanticscholar.org/graph/v1
//! An API key (header `x-api-key`) raises the rate limit to roughly 1 req/s.

use std::time::Duration;

use async_trait::async_trait;
use blatt_common::sandbox::SandboxClient as Client;
use blatt_common::{Paper, SourceKind};
use reqwest::StatusCode;
use tracing::{debug, instrument};

use super::PaperSource;
use crate::error::SourceError;
use crate::rate_limit::{RateLimiter, RetryPolicy};

const S2_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";
const S2_FIELDS: &str =
    "paperId,title,authors,year,abstract,citationCount,url,venue,fieldsOfStudy,externalIds";
const S2_SEARCH_MAX: usize = 100;
const S2_GRAPH_MAX: usize = 1000;
const PROVIDER: &str = "s2";

pub struct SemanticScholarClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    limiter: RateLimiter,
}

impl SemanticScholarClient {
    pub fn new(api_key: Option<String>, request_timeout: Duration) -> Result<Self, SourceError> {
        let client = Client::with_options(request_timeout, None)?;
        let policy = RetryPolicy::semantic_scholar(api_key.is_some());
        Ok(Self {
            client,
            base_url: S2_API_BASE.to_string(),
            api_key,
            limiter: RateLimiter::new(policy),
        })
    }

    /// Point the client at another host (a local mock in tests).
    pub fn with_base_url(mut self, base_url: &str, policy: RetryPolicy) -> Self {
        if let Some(host) = url_host(base_url) {
            self.client.allow_domain(&host);
        }
        self.base_url = base_url.trim_end_matches('/').to_string();
        self.limiter = RateLimiter::new(policy);
        self
    }

    /// GET `path` with the shared fields and auth header.
    /// `Ok(None)` for 404 and for exhausted retries.
    async fn get_json(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Option<serde_json::Value>, SourceError> {
        let url = format!("{}/{}", self.base_url, path);
        let (client, url, api_key) = (&self.client, url.as_str(), self.api_key.as_deref());
        let resp = self
            .limiter
            .execute(PROVIDER, || async move {
                let mut req = client.get(url)?.query(params);
                if let Some(key) = api_key {
                    req = req.header("x-api-key", key);
                }
                Ok::<_, SourceError>(req.send().await?)
            })
            .await?;

        let Some(resp) = resp else { return Ok(None) };
        if resp.status() == StatusCode::NOT_FOUND {
            debug!(path, "Semantic Scholar: not found");
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(SourceError::Status {
                provider: PROVIDER.to_string(),
                status: resp.status().as_u16(),
            });
        }
        let body = resp
            .json::<serde_json::Value>()
            .await
            .map_err(|e| SourceError::parse(PROVIDER, e.to_string()))?;
        Ok(Some(body))
    }

    async fn graph_edges(
        &self,
        paper_id: &str,
        edge: &str,
        node_key: &str,
        limit: usize,
    ) -> Result<Vec<Paper>, SourceError> {
        let path = format!("paper/{}/{}", paper_id, edge);
        let params = [
            ("fields", S2_FIELDS.to_string()),
            ("limit", limit.min(S2_GRAPH_MAX).to_string()),
        ];
        let Some(body) = self.get_json(&path, &params).await? else {
            return Ok(Vec::new());
        };
        let papers: Vec<Paper> = body["data"]
            .as_array()
            .map(|items| items.iter().filter_map(|item| s2_to_paper(&item[node_key])).collect())
            .unwrap_or_default();
        debug!(paper_id, edge, n = papers.len(), "Semantic Scholar graph results");
        Ok(papers)
    }
}

#[async_trait]
impl PaperSource for SemanticScholarClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn kind(&self) -> SourceKind {
        SourceKind::SemanticScholar
    }

    #[instrument(skip(self))]
    async fn search(
        &self,
        query: &str,
        limit: usize,
        year_from: Option<i32>,
    ) -> Result<Vec<Paper>, SourceError> {
        let mut params = vec![
            ("query", query.trim().to_string()),
            ("limit", limit.clamp(1, S2_SEARCH_MAX).to_string()),
            ("fields", S2_FIELDS.to_string()),
        ];
        if let Some(y) = year_from {
            params.push(("year", format!("{y}-")));
        }
        let Some(body) = self.get_json("paper/search", &params).await? else {
            return Ok(Vec::new());
        };
        let papers: Vec<Paper> = body["data"]
            .as_array()
            .map(|items| items.iter().filter_map(s2_to_paper).collect())
            .unwrap_or_default();
        debug!(n = papers.len(), "Semantic Scholar search results");
        Ok(papers)
    }

    #[instrument(skip(self))]
    async fn get_citations(&self, paper_id: &str, limit: usize) -> Result<Vec<Paper>, SourceError> {
        self.graph_edges(paper_id, "citations", "citingPaper", limit).await
    }

    #[instrument(skip(self))]
    async fn get_references(&self, paper_id: &str, limit: usize) -> Result<Vec<Paper>, SourceError> {
        self.graph_edges(paper_id, "references", "citedPaper", limit).await
    }

    #[instrument(skip(self))]
    async fn lookup_doi(&self, doi: &str) -> Result<Option<Paper>, SourceError> {
        let path = format!("paper/DOI:{}", doi);
        let params = [("fields", S2_FIELDS.to_string())];
        Ok(self.get_json(&path, &params).await?.as_ref().and_then(s2_to_paper))
    }

    fn supports_graph(&self) -> bool {
        true
    }
}

pub(crate) fn url_host(url: &str) -> Option<String> {
    url::Url::parse(url).ok()?.host_str().map(String::from)
}

// ── Conversion ─────────────────────────────────────────────────────────────

/// Records without a `paperId` or title are dropped.
fn s2_to_paper(v: &serde_json::Value) -> Option<Paper> {
    let id = v["paperId"].as_str().filter(|s| !s.is_empty())?;
    let title = v["title"].as_str().map(str::trim).filter(|t| !t.is_empty())?;

    let mut paper = Paper::new(id, title);
    paper.source = SourceKind::SemanticScholar;
    paper.authors = v["authors"]
        .as_array()
        .map(|a| {
            a.iter()
                .filter_map(|au| au["name"].as_str())
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .collect()
        })
        .unwrap_or_default();
    paper.year = v["year"].as_i64().map(|y| y as i32);
    paper.abstract_text = v["abstract"]
        .as_str()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from);
    paper.doi = v["externalIds"]["DOI"].as_str().map(String::from);
    paper.citation_count = v["citationCount"].as_u64().unwrap_or(0) as u32;
    paper.url = v["url"].as_str().map(String::from);
    paper.venue = v["venue"].as_str().filter(|s| !s.is_empty()).map(String::from);
    paper.fields_of_study = v["fieldsOfStudy"]
        .as_array()
        .map(|f| f.iter().filter_map(|x| x.as_str()).map(String::from).collect())
        .unwrap_or_default();
    Some(paper)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s2_to_paper_full() {
        let v = serde_json::json!({
            "paperId": "abc123",
            "title": "  Rail Digital Twins ",
            "authors": [{"name": "Ada Lovelace"}, {"name": ""}],
            "year": 2021,
            "abstract": "We build twins.",
            "citationCount": 42,
            "url": "https://www.semanticscholar.org/paper/abc123",
            "venue": "ICRA",
            "fieldsOfStudy": ["Computer Science", "Engineering"],
            "externalIds": {"DOI": "10.1000/rail", "ArXiv": "2101.00001"}
        });
        let p = s2_to_paper(&v).unwrap();
        assert_eq!(p.id, "abc123");
        assert_eq!(p.title, "Rail Digital Twins");
        assert_eq!(p.authors, vec!["Ada Lovelace"]);
        assert_eq!(p.year, Some(2021));
        assert_eq!(p.doi.as_deref(), Some("10.1000/rail"));
        assert_eq!(p.citation_count, 42);
        assert_eq!(p.venue.as_deref(), Some("ICRA"));
        assert!(p.fields_of_study.contains("Engineering"));
        assert_eq!(p.source, SourceKind::SemanticScholar);
    }

    #[test]
    fn test_s2_to_paper_nulls() {
        let v = serde_json::json!({
            "paperId": "x", "title": "T", "authors": null, "year": null,
            "abstract": null, "citationCount": null, "fieldsOfStudy": null,
            "externalIds": null, "venue": ""
        });
        let p = s2_to_paper(&v).unwrap();
        assert!(p.authors.is_empty());
        assert_eq!(p.citation_count, 0);
        assert!(p.abstract_text.is_none());
        assert!(p.venue.is_none());
        assert!(p.fields_of_study.is_empty());
    }

    #[test]
    fn test_s2_to_paper_requires_id_and_title() {
        assert!(s2_to_paper(&serde_json::json!({"title": "No id"})).is_none());
        assert!(s2_to_paper(&serde_json::json!({"paperId": "p", "title": "  "})).is_none());
        assert!(s2_to_paper(&serde_json::Value::Null).is_none());
    }

    #[test]
    fn test_url_host() {
        assert_eq!(url_host("http://127.0.0.1:8080/graph/v1").as_deref(), Some("127.0.0.1"));
        assert!(url_host("not a url").is_none());
    }
}
