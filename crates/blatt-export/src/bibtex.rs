//! BibTeX rendering for reference managers.

use blatt_common::RankedPaper;

const ABSTRACT_CHARS: usize = 500;

const CONFERENCE_WORDS: &[&str] = &[
    "conference", "proceedings", "workshop", "symposium", "cvpr", "iccv", "eccv", "nips", "icml", "iclr", "aaai",
    "ijcai", "acl", "emnlp", "icra", "iros",
];
const JOURNAL_WORDS: &[&str] = &["journal", "transactions", "letters", "nature", "science", "pnas", "cell", "lancet"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    Article,
    InProceedings,
    Misc,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Article => "article",
            EntryType::InProceedings => "inproceedings",
            EntryType::Misc => "misc",
        }
    }

    pub fn infer(venue: Option<&str>) -> Self {
        let Some(venue) = venue.map(str::trim).filter(|v| !v.is_empty()) else {
            return EntryType::Misc;
        };
        let venue = venue.to_lowercase();
        if CONFERENCE_WORDS.iter().any(|w| venue.contains(w)) {
            EntryType::InProceedings
        } else if JOURNAL_WORDS.iter().any(|w| venue.contains(w)) {
            EntryType::Article
        } else if venue.contains("arxiv") {
            EntryType::Misc
        } else {
            EntryType::Article
        }
    }
}

/// Escape characters LaTeX treats specially.
pub fn escape_latex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '~' => out.push_str(r"\textasciitilde{}"),
            '^' => out.push_str(r"\textasciicircum{}"),
            '\\' => out.push_str(r"\textbackslash{}"),
            _ => out.push(c),
        }
    }
    out
}

/// `{FirstAuthorAlnum}{year|XXXX}_{index:03}`
pub fn cite_key(paper: &RankedPaper, index: usize) -> String {
    let author: String = paper.paper.first_author().chars().filter(|c| c.is_alphanumeric()).collect();
    let year = paper.paper.year.map(|y| y.to_string()).unwrap_or_else(|| "XXXX".to_string());
    format!("{author}{year}_{index:03}")
}

pub fn render_entry(paper: &RankedPaper, index: usize) -> String {
    let p = &paper.paper;
    let entry_type = EntryType::infer(p.venue.as_deref());
    let authors = if p.authors.is_empty() { "Unknown".to_string() } else { p.authors.join(" and ") };
    let year = p.year.map(|y| y.to_string()).unwrap_or_else(|| "N/A".to_string());
    let venue = p.venue.as_deref().map(str::trim).filter(|v| !v.is_empty());

    let mut fields = vec![
        ("title", escape_latex(&p.title)),
        ("author", authors),
        ("year", year),
    ];
    match entry_type {
        EntryType::Article => fields.push(("journal", escape_latex(venue.unwrap_or("Unknown")))),
        EntryType::InProceedings => fields.push(("booktitle", escape_latex(venue.unwrap_or("Unknown Conference")))),
        EntryType::Misc => {
            if let Some(v) = venue {
                fields.push(("howpublished", escape_latex(v)));
            }
        }
    }
    if entry_type != EntryType::Misc {
        if let Some(doi) = &p.doi {
            fields.push(("doi", doi.clone()));
        }
    }
    if let Some(url) = &p.url {
        fields.push(("url", url.clone()));
    }
    if entry_type == EntryType::Article {
        if let Some(abstract_text) = p.abstract_text.as_deref().filter(|a| !a.trim().is_empty()) {
            let truncated: String = abstract_text.chars().take(ABSTRACT_CHARS).collect();
            fields.push(("abstract", format!("{}...", escape_latex(&truncated))));
        }
    }
    fields.push(("note", format!("Priority: {}", paper.priority())));

    let body = fields
        .iter()
        .map(|(k, v)| format!("  {k} = {{{v}}}"))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("@{}{{{},\n{}\n}}", entry_type.as_str(), cite_key(paper, index), body)
}

/// All entries, separated by blank lines.
pub fn render(papers: &[RankedPaper]) -> String {
    papers
        .iter()
        .enumerate()
        .map(|(i, p)| render_entry(p, i))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use blatt_common::{Paper, Score};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn ranked(paper: Paper, priority: u8) -> RankedPaper {
        let score = Score::new(Uuid::nil(), paper.id.clone(), priority);
        RankedPaper { paper, score }
    }

    #[test]
    fn test_entry_type_inference() {
        assert_eq!(EntryType::infer(Some("CVPR 2020")), EntryType::InProceedings);
        assert_eq!(EntryType::infer(Some("IEEE Transactions on Robotics")), EntryType::Article);
        assert_eq!(EntryType::infer(Some("arXiv preprint")), EntryType::Misc);
        assert_eq!(EntryType::infer(Some("Some Venue")), EntryType::Article);
        assert_eq!(EntryType::infer(Some("  ")), EntryType::Misc);
        assert_eq!(EntryType::infer(None), EntryType::Misc);
    }

    #[test]
    fn test_escape_latex() {
        assert_eq!(escape_latex("ML & AI: 50% in $100 #2023"), r"ML \& AI: 50\% in \$100 \#2023");
        assert_eq!(escape_latex(r"a\b~c^d_{e}"), r"a\textbackslash{}b\textasciitilde{}c\textasciicircum{}d\_\{e\}");
    }

    #[test]
    fn test_cite_key() {
        let mut p = Paper::new("1", "T");
        p.authors = vec!["Jean-Luc O'Brien".into()];
        p.year = Some(2020);
        assert_eq!(cite_key(&ranked(p.clone(), 5), 7), "JeanLucOBrien2020_007");
        p.year = None;
        p.authors.clear();
        assert_eq!(cite_key(&ranked(p, 5), 12), "UnknownXXXX_012");
    }

    #[test]
    fn test_render_inproceedings_entry() {
        let mut p = Paper::new("1", "Deep Learning for Driving");
        p.authors = vec!["John Smith".into(), "Jane Doe".into()];
        p.year = Some(2020);
        p.venue = Some("CVPR 2020".into());
        p.doi = Some("10.1109/x".into());
        p.abstract_text = Some("ignored for conference entries".into());
        let entry = render_entry(&ranked(p, 5), 0);
        assert_eq!(
            entry,
            "@inproceedings{JohnSmith2020_000,\n  title = {Deep Learning for Driving},\n  author = {John Smith and Jane Doe},\n  year = {2020},\n  booktitle = {CVPR 2020},\n  doi = {10.1109/x},\n  note = {Priority: 5}\n}"
        );
    }

    #[test]
    fn test_render_article_truncates_abstract() {
        let mut p = Paper::new("1", "Survey");
        p.venue = Some("Journal of Things".into());
        p.abstract_text = Some("x".repeat(800));
        let entry = render_entry(&ranked(p, 4), 1);
        assert!(entry.starts_with("@article{UnknownXXXX_001,"));
        assert!(entry.contains(&format!("  abstract = {{{}...}}", "x".repeat(500))));
        assert!(entry.contains("  year = {N/A}"));
    }

    #[test]
    fn test_render_joins_entries() {
        let a = ranked(Paper::new("a", "A"), 5);
        let b = ranked(Paper::new("b", "B"), 4);
        let out = render(&[a, b]);
        assert_eq!(out.matches("@misc{").count(), 2);
        assert!(out.contains("}\n\n@misc{UnknownXXXX_001"));
    }
}
