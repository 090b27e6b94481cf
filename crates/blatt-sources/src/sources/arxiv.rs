//! arXiv Atom API client.
//!
//! API: http://export.arxiv.org/api/query
//! arXiv asks for at most one request every 3 seconds. The feed carries no
//! citation counts, so every record reports 0 and the year filter is applied
//! locally after parsing.

use std::time::Duration;

use async_trait::async_trait;
use blatt_common::sandbox::SandboxClient as Client;
use blatt_common::{Paper, SourceKind};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, instrument, warn};

use super::semantic_scholar::url_host;
use super::PaperSource;
use crate::error::SourceError;
use crate::rate_limit::{RateLimiter, RetryPolicy};

const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";
const PROVIDER: &str = "arxiv";

pub struct ArxivClient {
    client: Client,
    api_url: String,
    limiter: RateLimiter,
}

impl ArxivClient {
    pub fn new(request_timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: Client::with_options(request_timeout, None)?,
            api_url: ARXIV_API_URL.to_string(),
            limiter: RateLimiter::new(RetryPolicy::arxiv()),
        })
    }

    pub fn with_api_url(mut self, api_url: &str, policy: RetryPolicy) -> Self {
        if let Some(host) = url_host(api_url) {
            self.client.allow_domain(&host);
        }
        self.api_url = api_url.to_string();
        self.limiter = RateLimiter::new(policy);
        self
    }
}

#[async_trait]
impl PaperSource for ArxivClient {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn kind(&self) -> SourceKind {
        SourceKind::Arxiv
    }

    #[instrument(skip(self))]
    async fn search(
        &self,
        query: &str,
        limit: usize,
        year_from: Option<i32>,
    ) -> Result<Vec<Paper>, SourceError> {
        let params = [
            ("search_query", format!("all:{}", query.trim())),
            ("start", "0".to_string()),
            ("max_results", limit.max(1).to_string()),
            ("sortBy", "relevance".to_string()),
            ("sortOrder", "descending".to_string()),
        ];
        let (client, url, params) = (&self.client, self.api_url.as_str(), &params);
        let resp = self
            .limiter
            .execute(PROVIDER, || async move {
                Ok::<_, SourceError>(client.get(url)?.query(params).send().await?)
            })
            .await?;

        let Some(resp) = resp else { return Ok(Vec::new()) };
        if !resp.status().is_success() {
            return Err(SourceError::Status {
                provider: PROVIDER.to_string(),
                status: resp.status().as_u16(),
            });
        }
        let xml = resp.text().await?;
        let mut papers = parse_atom_feed(&xml)?;
        if let Some(y) = year_from {
            papers.retain(|p| p.year.is_some_and(|py| py >= y));
        }
        debug!(n = papers.len(), "arXiv search results");
        Ok(papers)
    }
}

// ── Atom parsing ─────────────────────────────────────────────────────────────

/// Text-bearing element currently open inside an `<entry>`.
#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
    Doi,
}

#[derive(Default)]
struct EntryDraft {
    id_url: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    categories: Vec<String>,
    pdf_url: Option<String>,
    doi: Option<String>,
}

impl EntryDraft {
    fn into_paper(self) -> Option<Paper> {
        let arxiv_id = extract_arxiv_id(&self.id_url)?;
        let title = collapse_ws(&self.title);
        if title.is_empty() {
            return None;
        }
        let mut paper = Paper::new(format!("arXiv:{arxiv_id}"), title);
        paper.source = SourceKind::Arxiv;
        paper.authors = self.authors;
        paper.year = self.published.get(..4).and_then(|y| y.parse().ok());
        let summary = collapse_ws(&self.summary);
        paper.abstract_text = (!summary.is_empty()).then_some(summary);
        paper.doi = self.doi.filter(|d| !d.is_empty());
        paper.url = self.pdf_url.or(Some(self.id_url));
        paper.venue = Some("arXiv".to_string());
        paper.fields_of_study = self.categories.into_iter().collect();
        Some(paper)
    }
}

/// Parse an arXiv Atom response. Entries without an id or title are skipped.
pub fn parse_atom_feed(xml: &str) -> Result<Vec<Paper>, SourceError> {
    let mut papers = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut current: Option<EntryDraft> = None;
    let mut field = Field::None;
    let mut in_author = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                if e.name().as_ref() == b"entry" {
                    current = Some(EntryDraft::default());
                } else if let Some(ref mut entry) = current {
                    match e.name().as_ref() {
                        b"id"        => field = Field::Id,
                        b"title"     => field = Field::Title,
                        b"summary"   => field = Field::Summary,
                        b"published" => field = Field::Published,
                        b"arxiv:doi" => field = Field::Doi,
                        b"author"    => in_author = true,
                        b"name" if in_author => field = Field::AuthorName,
                        _ => handle_attributes(entry, e),
                    }
                }
            }
            Ok(Event::Empty(ref e)) => {
                if let Some(ref mut entry) = current {
                    handle_attributes(entry, e);
                }
            }
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default();
                if let Some(ref mut entry) = current {
                    match field {
                        Field::Id         => entry.id_url.push_str(&text),
                        Field::Title      => push_spaced(&mut entry.title, &text),
                        Field::Summary    => push_spaced(&mut entry.summary, &text),
                        Field::Published  => entry.published.push_str(&text),
                        Field::AuthorName => {
                            let name = text.trim();
                            if !name.is_empty() {
                                entry.authors.push(name.to_string());
                            }
                        }
                        Field::Doi        => entry.doi = Some(text.trim().to_string()),
                        Field::None       => {}
                    }
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"entry" => {
                    if let Some(draft) = current.take() {
                        match draft.into_paper() {
                            Some(p) => papers.push(p),
                            None => warn!("Skipping arXiv entry without id or title"),
                        }
                    }
                    field = Field::None;
                    in_author = false;
                }
                b"author" => {
                    in_author = false;
                    field = Field::None;
                }
                _ => field = Field::None,
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(SourceError::parse(
                    PROVIDER,
                    format!("XML error at position {}: {}", reader.error_position(), e),
                ));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(papers)
}

/// `<link title="pdf" href=…>` and `<category term=…>`.
fn handle_attributes(entry: &mut EntryDraft, e: &BytesStart<'_>) {
    match e.name().as_ref() {
        b"link" => {
            if attr(e, b"title").as_deref() == Some("pdf") {
                entry.pdf_url = attr(e, b"href");
            }
        }
        b"category" => {
            if let Some(term) = attr(e, b"term").filter(|t| !t.is_empty()) {
                entry.categories.push(term);
            }
        }
        _ => {}
    }
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.try_get_attribute(key)
        .ok()
        .flatten()
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn push_spaced(target: &mut String, text: &str) {
    if !target.is_empty() {
        target.push(' ');
    }
    target.push_str(text);
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `http://arxiv.org/abs/2101.00001v3` → `2101.00001`.
/// Old-style ids (`cs/0112017v1`) keep their archive prefix.
pub fn extract_arxiv_id(id_url: &str) -> Option<String> {
    let raw = id_url.trim().rsplit_once("/abs/")?.1;
    let id = match raw.rfind('v') {
        Some(pos) if pos > 0 && raw[pos + 1..].chars().all(|c| c.is_ascii_digit()) && pos + 1 < raw.len() => {
            &raw[..pos]
        }
        _ => raw,
    };
    (!id.is_empty()).then(|| id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title>ArXiv Query: all:rail</title>
  <id>http://arxiv.org/api/abc</id>
  <entry>
    <id>http://arxiv.org/abs/2101.00001v2</id>
    <published>2021-01-01T00:00:00Z</published>
    <title>Digital Twins for
      Autonomous Rail</title>
    <summary>We simulate &amp; test
      rail vehicles.</summary>
    <author><name>Ada Lovelace</name></author>
    <author><name>Alan Turing</name></author>
    <arxiv:doi>10.1000/rail.1</arxiv:doi>
    <link href="http://arxiv.org/abs/2101.00001v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2101.00001v2" rel="related" type="application/pdf"/>
    <category term="cs.RO" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.CV" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/cs/0112017v1</id>
    <published>2001-12-01T00:00:00Z</published>
    <title>Old Style Identifier</title>
    <summary></summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_atom_feed() {
        let papers = parse_atom_feed(FEED).unwrap();
        assert_eq!(papers.len(), 2);

        let p = &papers[0];
        assert_eq!(p.id, "arXiv:2101.00001");
        assert_eq!(p.title, "Digital Twins for Autonomous Rail");
        assert_eq!(p.abstract_text.as_deref(), Some("We simulate & test rail vehicles."));
        assert_eq!(p.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(p.year, Some(2021));
        assert_eq!(p.doi.as_deref(), Some("10.1000/rail.1"));
        assert_eq!(p.url.as_deref(), Some("http://arxiv.org/pdf/2101.00001v2"));
        assert_eq!(p.venue.as_deref(), Some("arXiv"));
        assert_eq!(p.citation_count, 0);
        assert!(p.fields_of_study.contains("cs.RO"));

        let old = &papers[1];
        assert_eq!(old.id, "arXiv:cs/0112017");
        assert!(old.abstract_text.is_none());
        assert_eq!(old.url.as_deref(), Some("http://arxiv.org/abs/cs/0112017v1"));
    }

    #[test]
    fn test_feed_title_is_not_an_entry() {
        let xml = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>empty</title></feed>"#;
        assert!(parse_atom_feed(xml).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_xml_is_parse_error() {
        let err = parse_atom_feed("<feed><entry><id>x</feed>").unwrap_err();
        assert!(matches!(err, SourceError::Parse { .. }));
    }

    #[test]
    fn test_extract_arxiv_id() {
        assert_eq!(extract_arxiv_id("http://arxiv.org/abs/2101.00001v12").as_deref(), Some("2101.00001"));
        assert_eq!(extract_arxiv_id("http://arxiv.org/abs/2101.00001").as_deref(), Some("2101.00001"));
        assert_eq!(extract_arxiv_id("http://arxiv.org/abs/solv-int/9901001v1").as_deref(), Some("solv-int/9901001"));
        assert_eq!(extract_arxiv_id("http://example.org/2101.00001"), None);
    }
}
