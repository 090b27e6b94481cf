//! Paper builders.

use blatt_common::{Paper, SourceKind};

/// Start building a paper with the given id and title.
pub fn paper(id: &str, title: &str) -> PaperBuilder {
    PaperBuilder { paper: Paper::new(id, title) }
}

pub struct PaperBuilder {
    paper: Paper,
}

impl PaperBuilder {
    pub fn author(mut self, name: &str) -> Self {
        self.paper.authors.push(name.to_string());
        self
    }

    pub fn authors(mut self, names: &[&str]) -> Self {
        self.paper.authors.extend(names.iter().map(|n| n.to_string()));
        self
    }

    pub fn year(mut self, year: i32) -> Self {
        self.paper.year = Some(year);
        self
    }

    pub fn abstract_text(mut self, text: &str) -> Self {
        self.paper.abstract_text = Some(text.to_string());
        self
    }

    pub fn doi(mut self, doi: &str) -> Self {
        self.paper.doi = Some(doi.to_string());
        self
    }

    pub fn citations(mut self, count: u32) -> Self {
        self.paper.citation_count = count;
        self
    }

    pub fn venue(mut self, venue: &str) -> Self {
        self.paper.venue = Some(venue.to_string());
        self
    }

    pub fn url(mut self, url: &str) -> Self {
        self.paper.url = Some(url.to_string());
        self
    }

    pub fn source(mut self, kind: SourceKind) -> Self {
        self.paper.source = kind;
        self
    }

    pub fn build(self) -> Paper {
        self.paper
    }
}

impl From<PaperBuilder> for Paper {
    fn from(b: PaperBuilder) -> Self {
        b.build()
    }
}
