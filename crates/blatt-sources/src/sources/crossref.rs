//! CrossRef works client.
//!
//! Used for two purposes:
//! 1. Free-text search over registered works (journals and proceedings)
//! 2. Resolving a bare DOI to metadata, to complete papers that arrived
//!    from another provider without an abstract
//!
//! API: https://api.crossref.org/works
//! Polite pool: set User-Agent with mailto (see CrossRef etiquette)

use std::time::Duration;

use async_trait::async_trait;
use blatt_common::sandbox::SandboxClient as Client;
use blatt_common::{Paper, SourceKind};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, instrument};

use super::semantic_scholar::url_host;
use super::PaperSource;
use crate::error::SourceError;
use crate::rate_limit::{RateLimiter, RetryPolicy};

const CR_API_BASE: &str = "https://api.crossref.org/works";
const DEFAULT_MAILTO: &str = "blatt@example.com";
const PROVIDER: &str = "crossref";

lazy_static! {
    static ref MARKUP_TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
}

pub struct CrossRefClient {
    client: Client,
    api_base: String,
    limiter: RateLimiter,
}

impl CrossRefClient {
    pub fn new(mailto: Option<&str>, request_timeout: Duration) -> Result<Self, SourceError> {
        let user_agent = format!(
            "Blatt/{} (mailto:{})",
            env!("CARGO_PKG_VERSION"),
            mailto.unwrap_or(DEFAULT_MAILTO)
        );
        Ok(Self {
            client: Client::with_options(request_timeout, Some(&user_agent))?,
            api_base: CR_API_BASE.to_string(),
            limiter: RateLimiter::new(RetryPolicy::crossref()),
        })
    }

    pub fn with_api_base(mut self, api_base: &str, policy: RetryPolicy) -> Self {
        if let Some(host) = url_host(api_base) {
            self.client.allow_domain(&host);
        }
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.limiter = RateLimiter::new(policy);
        self
    }

    async fn get_message(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<Option<serde_json::Value>, SourceError> {
        let client = &self.client;
        let resp = self
            .limiter
            .execute(PROVIDER, || async move {
                Ok::<_, SourceError>(client.get(url)?.query(params).send().await?)
            })
            .await?;

        let Some(resp) = resp else { return Ok(None) };
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(SourceError::Status {
                provider: PROVIDER.to_string(),
                status: resp.status().as_u16(),
            });
        }
        let mut body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| SourceError::parse(PROVIDER, e.to_string()))?;
        Ok(Some(body["message"].take()))
    }
}

#[async_trait]
impl PaperSource for CrossRefClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn kind(&self) -> SourceKind {
        SourceKind::CrossRef
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
            ("rows", limit.max(1).to_string()),
            ("sort", "relevance".to_string()),
        ];
        if let Some(y) = year_from {
            params.push(("filter", format!("from-pub-date:{y}")));
        }
        let Some(message) = self.get_message(&self.api_base, &params).await? else {
            return Ok(Vec::new());
        };
        let papers: Vec<Paper> = message["items"]
            .as_array()
            .map(|items| items.iter().filter_map(work_to_paper).collect())
            .unwrap_or_default();
        debug!(n = papers.len(), "CrossRef search results");
        Ok(papers)
    }

    /// Resolve a single DOI → Paper.
    #[instrument(skip(self))]
    async fn lookup_doi(&self, doi: &str) -> Result<Option<Paper>, SourceError> {
        let url = format!("{}/{}", self.api_base, doi);
        let message = self.get_message(&url, &[]).await?;
        Ok(message.as_ref().and_then(work_to_paper))
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────

/// Items without a DOI are not addressable and are dropped.
fn work_to_paper(work: &serde_json::Value) -> Option<Paper> {
    let doi = work["DOI"].as_str().map(str::trim).filter(|d| !d.is_empty())?;

    let title = work["title"]
        .as_array()
        .and_then(|t| t.first())
        .and_then(|t| t.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("Untitled");

    let mut paper = Paper::new(format!("DOI:{doi}"), title);
    paper.source = SourceKind::CrossRef;
    paper.doi = Some(doi.to_string());
    paper.url = Some(format!("https://doi.org/{doi}"));

    paper.abstract_text = work["abstract"]
        .as_str()
        .map(strip_jats)
        .filter(|a| !a.is_empty());

    paper.authors = work["author"]
        .as_array()
        .map(|authors| {
            authors
                .iter()
                .filter_map(|a| {
                    let given  = a["given"].as_str().unwrap_or("").trim();
                    let family = a["family"].as_str().unwrap_or("").trim();
                    let name = format!("{given} {family}").trim().to_string();
                    (!name.is_empty()).then_some(name)
                })
                .collect()
        })
        .unwrap_or_default();

    paper.venue = work["container-title"]
        .as_array()
        .and_then(|j| j.first())
        .and_then(|j| j.as_str())
        .filter(|j| !j.is_empty())
        .map(String::from);

    paper.year = ["published-print", "published-online", "published"]
        .iter()
        .find_map(|key| date_year(&work[*key]));

    paper.citation_count = work["is-referenced-by-count"].as_u64().unwrap_or(0) as u32;
    Some(paper)
}

/// First element of `date-parts[0]`.
fn date_year(date: &serde_json::Value) -> Option<i32> {
    date["date-parts"]
        .as_array()
        .and_then(|dp| dp.first())
        .and_then(|dp| dp.as_array())
        .and_then(|parts| parts.first())
        .and_then(|y| y.as_i64())
        .map(|y| y as i32)
}

/// CrossRef returns JATS XML snippets in abstract; strip the markup.
fn strip_jats(raw: &str) -> String {
    let paragraphs = raw.replace("</jats:p>", "\n");
    MARKUP_TAG
        .replace_all(&paragraphs, "")
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_work_to_paper_minimal() {
        let work = serde_json::json!({
            "DOI": "10.1000/test",
            "title": ["Test Paper Title"],
            "abstract": "<jats:p>Test abstract.</jats:p>",
            "author": [{ "given": "Jane", "family": "Doe" }, { "family": "Solo" }],
            "container-title": ["IEEE Transactions on Robotics"],
            "published-online": { "date-parts": [[2023, 2]] },
            "published": { "date-parts": [[2024, 6, 1]] },
            "is-referenced-by-count": 17
        });
        let p = work_to_paper(&work).unwrap();
        assert_eq!(p.id, "DOI:10.1000/test");
        assert_eq!(p.doi.as_deref(), Some("10.1000/test"));
        assert_eq!(p.title, "Test Paper Title");
        assert_eq!(p.abstract_text.as_deref(), Some("Test abstract."));
        assert_eq!(p.authors, vec!["Jane Doe", "Solo"]);
        assert_eq!(p.venue.as_deref(), Some("IEEE Transactions on Robotics"));
        assert_eq!(p.year, Some(2023));
        assert_eq!(p.citation_count, 17);
        assert_eq!(p.url.as_deref(), Some("https://doi.org/10.1000/test"));
    }

    #[test]
    fn test_print_date_preferred() {
        let work = serde_json::json!({
            "DOI": "10.1/x",
            "published-print": { "date-parts": [[2019]] },
            "published-online": { "date-parts": [[2018, 12]] }
        });
        let p = work_to_paper(&work).unwrap();
        assert_eq!(p.year, Some(2019));
        assert_eq!(p.title, "Untitled");
    }

    #[test]
    fn test_work_without_doi_is_dropped() {
        let work = serde_json::json!({ "title": ["No DOI"] });
        assert!(work_to_paper(&work).is_none());
    }

    #[test]
    fn test_jats_tag_stripping() {
        let raw = "<jats:p>Hello <jats:italic>world</jats:italic>.</jats:p><jats:p>Second.</jats:p>";
        assert_eq!(strip_jats(raw), "Hello world.\nSecond.");
    }
}
