//! Cross-source deduplication keys.
//!
//! Two keys are in use. During aggregation a candidate is identified by its
//! normalised title plus first author, so the same work reported by two
//! providers under different ids collapses to the first one seen. Final
//! results are deduplicated once more by `(title, year)`.

use std::collections::HashSet;

use blatt_common::Paper;

/// `"{normalized_title}_{first_author}"`, lower-cased. Falls back to the id
/// when the title is blank.
pub fn candidate_key(paper: &Paper) -> String {
    let title = paper.normalized_title();
    if title.is_empty() {
        return paper.id.to_lowercase();
    }
    format!("{}_{}", title, paper.first_author()).to_lowercase()
}

/// `(lower(trim(title)), year)`, or `(id, year)` for untitled records.
pub fn title_year_key(paper: &Paper) -> (String, Option<i32>) {
    let title = paper.title.trim().to_lowercase();
    if title.is_empty() {
        (paper.id.clone(), paper.year)
    } else {
        (title, paper.year)
    }
}

/// First-seen-wins set over `candidate_key`.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the paper has not been seen before.
    pub fn insert(&mut self, paper: &Paper) -> bool {
        self.seen.insert(candidate_key(paper))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(id: &str, title: &str, author: Option<&str>) -> Paper {
        let mut p = Paper::new(id, title);
        if let Some(a) = author {
            p.authors.push(a.to_string());
        }
        p
    }

    #[test]
    fn test_candidate_key_normalises_title() {
        let a = paper("s2-1", "  Rail   Twins ", Some("Ada Lovelace"));
        let b = paper("arXiv:2101.1", "rail twins", Some("ada lovelace"));
        assert_eq!(candidate_key(&a), candidate_key(&b));
        assert_eq!(candidate_key(&a), "rail twins_ada lovelace");
    }

    #[test]
    fn test_candidate_key_without_authors_uses_unknown() {
        assert_eq!(candidate_key(&paper("x", "T", None)), "t_unknown");
    }

    #[test]
    fn test_untitled_papers_keyed_by_id() {
        let a = paper("DOI:10.1/a", "", None);
        let b = paper("DOI:10.1/b", "  ", None);
        assert_ne!(candidate_key(&a), candidate_key(&b));
        assert_eq!(title_year_key(&a), ("DOI:10.1/a".to_string(), None));
    }

    #[test]
    fn test_deduplicator_first_wins() {
        let mut d = Deduplicator::new();
        assert!(d.insert(&paper("1", "Same", Some("A"))));
        assert!(!d.insert(&paper("2", "same", Some("a"))));
        assert!(d.insert(&paper("3", "same", Some("B"))));
        assert_eq!(d.len(), 2);
    }
}
