//! blatt-export: result sinks for a finished search.
//! Covers:
//! - CSV paper table
//! - BibTeX entries with venue-based entry types
//! - JSON citation graph with summary statistics
//!
//! # Example
//!
//! ```rust,no_run
//! # fn demo(papers: &[blatt_common::RankedPaper], rels: &[blatt_common::Relationship]) -> Result<(), blatt_export::ExportError> {
//! let paths = blatt_export::export_session("exports", uuid::Uuid::new_v4(), papers, rels)?;
//! println!("{}", paths.csv.display());
//! # Ok(())
//! # }
//! ```

pub mod bibtex;
pub mod csv;
pub mod graph;

use std::fs;
use std::path::{Path, PathBuf};

use blatt_common::{RankedPaper, Relationship};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub use graph::{GraphDocument, GraphEdge, GraphNode, GraphStats};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Files written by `export_session`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub csv: PathBuf,
    pub bibtex: PathBuf,
    pub graph: PathBuf,
}

/// Write `csv/`, `bibtex/` and `graph/` files for one session under `dir`.
pub fn export_session(
    dir: impl AsRef<Path>,
    search_id: Uuid,
    papers: &[RankedPaper],
    relationships: &[Relationship],
) -> Result<ExportPaths, ExportError> {
    let dir = dir.as_ref();
    let paths = ExportPaths {
        csv: dir.join("csv").join(format!("search_{search_id}_papers.csv")),
        bibtex: dir.join("bibtex").join(format!("search_{search_id}_papers.bib")),
        graph: dir.join("graph").join(format!("search_{search_id}_graph.json")),
    };
    for path in [&paths.csv, &paths.bibtex, &paths.graph] {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
    }

    csv::write_papers(fs::File::create(&paths.csv)?, papers)?;
    fs::write(&paths.bibtex, bibtex::render(papers))?;
    let doc = graph::build(papers, relationships);
    fs::write(&paths.graph, serde_json::to_string_pretty(&doc)?)?;

    info!(
        search_id = %search_id,
        papers = papers.len(),
        edges = doc.edges.len(),
        dir = %dir.display(),
        "Session exported"
    );
    Ok(paths)
}
