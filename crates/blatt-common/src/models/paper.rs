//! Canonical paper and citation-edge records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Which provider first produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    SemanticScholar,
    Arxiv,
    CrossRef,
    #[default]
    Unknown,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::SemanticScholar => "s2",
            SourceKind::Arxiv           => "arxiv",
            SourceKind::CrossRef        => "crossref",
            SourceKind::Unknown         => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "s2" | "semantic_scholar" | "semanticscholar" => SourceKind::SemanticScholar,
            "arxiv"    => SourceKind::Arxiv,
            "crossref" => SourceKind::CrossRef,
            _          => SourceKind::Unknown,
        }
    }
}

/// A paper independent of the provider it came from.
///
/// `id` is namespaced so that it is unique across providers: raw Semantic
/// Scholar ids, `arXiv:<id>` and `DOI:<doi>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paper {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub year: Option<i32>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub doi: Option<String>,
    #[serde(default)]
    pub citation_count: u32,
    pub url: Option<String>,
    pub venue: Option<String>,
    #[serde(default)]
    pub fields_of_study: BTreeSet<String>,
    #[serde(default)]
    pub source: SourceKind,
}

impl Paper {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            authors: Vec::new(),
            year: None,
            abstract_text: None,
            doi: None,
            citation_count: 0,
            url: None,
            venue: None,
            fields_of_study: BTreeSet::new(),
            source: SourceKind::Unknown,
        }
    }

    pub fn first_author(&self) -> &str {
        self.authors.first().map(String::as_str).unwrap_or("Unknown")
    }

    /// Lower-cased `title + abstract`, the text every matcher runs against.
    pub fn text(&self) -> String {
        format!(
            "{} {}",
            self.title,
            self.abstract_text.as_deref().unwrap_or("")
        )
        .to_lowercase()
    }

    pub fn normalized_title(&self) -> String {
        normalize_title(&self.title)
    }

    /// Fill fields this record is missing from `other`. Never erases data.
    pub fn merge_from(&mut self, other: &Paper) {
        if self.title.trim().is_empty() && !other.title.trim().is_empty() {
            self.title = other.title.clone();
        }
        if self.authors.is_empty() {
            self.authors = other.authors.clone();
        }
        if self.year.is_none() {
            self.year = other.year;
        }
        if self.abstract_text.as_deref().map_or(true, |a| a.trim().is_empty()) {
            if let Some(a) = other.abstract_text.as_deref().filter(|a| !a.trim().is_empty()) {
                self.abstract_text = Some(a.to_string());
            }
        }
        if self.doi.is_none() {
            self.doi = other.doi.clone();
        }
        if self.url.is_none() {
            self.url = other.url.clone();
        }
        if self.venue.is_none() {
            self.venue = other.venue.clone();
        }
        self.citation_count = self.citation_count.max(other.citation_count);
        self.fields_of_study.extend(other.fields_of_study.iter().cloned());
    }
}

/// Lower-case, trim and collapse internal whitespace.
pub fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

// ── Relationships ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    #[default]
    Cites,
    Improves,
    BuildsOn,
    Compares,
    Applies,
    Surveys,
    Extends,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 7] = [
        RelationshipType::Cites,
        RelationshipType::Improves,
        RelationshipType::BuildsOn,
        RelationshipType::Compares,
        RelationshipType::Applies,
        RelationshipType::Surveys,
        RelationshipType::Extends,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Cites    => "cites",
            RelationshipType::Improves => "improves",
            RelationshipType::BuildsOn => "builds_on",
            RelationshipType::Compares => "compares",
            RelationshipType::Applies  => "applies",
            RelationshipType::Surveys  => "surveys",
            RelationshipType::Extends  => "extends",
        }
    }

    /// Unrecognised tags fall back to `cites`.
    pub fn parse_lenient(s: &str) -> Self {
        let tag = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == tag)
            .unwrap_or_default()
    }
}

impl fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed edge: `source_paper_id` cites `target_paper_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_paper_id: String,
    pub target_paper_id: String,
    #[serde(default)]
    pub relationship_type: RelationshipType,
    pub description: Option<String>,
}

impl Relationship {
    pub fn cites(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source_paper_id: source.into(),
            target_paper_id: target.into(),
            relationship_type: RelationshipType::Cites,
            description: None,
        }
    }

    pub fn key(&self) -> (&str, &str) {
        (&self.source_paper_id, &self.target_paper_id)
    }
}
