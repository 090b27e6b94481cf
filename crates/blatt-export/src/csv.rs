//! Ranked paper table as CSV.

use std::io::Write;

use blatt_common::RankedPaper;

use crate::ExportError;

pub const COLUMNS: [&str; 11] = [
    "rank", "priority", "title", "authors", "year", "venue", "citations", "doi", "url", "matched_keywords", "reason",
];

/// Write one row per paper, ranked from 1 in input order.
pub fn write_papers<W: Write>(writer: W, papers: &[RankedPaper]) -> Result<(), ExportError> {
    let mut out = ::csv::Writer::from_writer(writer);
    out.write_record(COLUMNS)?;
    for (i, ranked) in papers.iter().enumerate() {
        let p = &ranked.paper;
        out.write_record([
            (i + 1).to_string(),
            ranked.priority().to_string(),
            p.title.clone(),
            p.authors.join("; "),
            p.year.map(|y| y.to_string()).unwrap_or_default(),
            p.venue.clone().unwrap_or_default(),
            p.citation_count.to_string(),
            p.doi.clone().unwrap_or_default(),
            p.url.clone().unwrap_or_default(),
            ranked.score.matched_keywords.join(", "),
            ranked.score.reason.clone(),
        ])?;
    }
    out.flush()?;
    Ok(())
}

pub fn to_string(papers: &[RankedPaper]) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    write_papers(&mut buf, papers)?;
    String::from_utf8(buf).map_err(|e| ExportError::Encoding(e.to_string()))
}
