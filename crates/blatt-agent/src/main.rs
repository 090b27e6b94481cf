//! Blatt: keyword-driven literature discovery over citation graphs.
//! Entry point for the `blatt` binary.

mod wiring;

use std::path::PathBuf;

use blatt_common::config::BlattConfig;
use blatt_common::SearchSession;
use blatt_pipeline::{RunOptions, SearchOutcome};
use blatt_web::AppState;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "blatt", version, about = "Find the papers that matter for a research question")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API.
    Serve {
        /// Overrides `server.bind`.
        #[arg(long, env = "BLATT_BIND")]
        bind: Option<String>,
    },
    /// Run one search and export the results.
    Search {
        #[arg(short, long)]
        keywords: String,
        #[arg(short, long, default_value = "")]
        description: String,
        /// Citation expansion depth (0 disables expansion).
        #[arg(long)]
        depth: Option<usize>,
        /// Maximum number of candidates to collect.
        #[arg(long)]
        limit: Option<usize>,
        /// Overrides `export.dir`.
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("blatt=debug,info")))
        .init();

    let cli = Cli::parse();
    info!("Blatt {} starting up", env!("CARGO_PKG_VERSION"));

    let config = BlattConfig::load()?;
    info!(
        llm = %config.llm.backend,
        depth = config.search.citation_depth,
        threshold = config.search.min_priority_threshold,
        "Configuration loaded"
    );

    let components = wiring::build(&config)?;

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let state = AppState::new(components.store, components.controller, components.pipeline_tx);
            blatt_web::serve(state, &bind).await?;
        }
        Command::Search { keywords, description, depth, limit, export_dir } => {
            let session = SearchSession::new(keywords, description);
            let options = RunOptions { total_limit: limit, citation_depth: depth };
            let outcome = components.controller.run_with(session, options).await;
            print_summary(&outcome);

            if !outcome.is_completed() {
                anyhow::bail!(
                    "search failed: {}",
                    outcome.session.error.as_deref().unwrap_or("unknown error")
                );
            }
            if outcome.papers.is_empty() {
                warn!("No relevant papers found; nothing to export");
                return Ok(());
            }
            let dir = export_dir.unwrap_or_else(|| PathBuf::from(&config.export.dir));
            let paths = blatt_export::export_session(&dir, outcome.session.id, &outcome.papers, &outcome.relationships)?;
            println!("CSV:     {}", paths.csv.display());
            println!("BibTeX:  {}", paths.bibtex.display());
            println!("Graph:   {}", paths.graph.display());
        }
    }

    Ok(())
}

fn print_summary(outcome: &SearchOutcome) {
    let s = &outcome.stats;
    println!("Search {} {} in {:.1}s", outcome.session.id, outcome.session.status.as_str(), outcome.duration_ms as f64 / 1000.0);
    println!("  candidates: {}  gated: {}  initial scored: {}", s.candidates, s.gated, s.initial_scored);
    println!("  seeds: {} (P5) / {} (P4)  expanded: {}", s.tier5_seeds, s.tier4_seeds, s.expanded_papers);
    if s.budget_exhausted {
        println!("  expansion budget exhausted");
    }
    if s.failed_batches > 0 {
        println!("  {} scoring batch(es) failed", s.failed_batches);
    }
    for err in &outcome.errors {
        println!("  warning: {err}");
    }
    println!("{} relevant papers:", outcome.papers.len());
    for r in &outcome.papers {
        let year = r.paper.year.map(|y| y.to_string()).unwrap_or_else(|| "n.d.".to_string());
        println!("  [P{}] {} ({}, {})", r.priority(), r.paper.title, r.paper.first_author(), year);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_search_args() {
        let cli = Cli::try_parse_from(["blatt", "search", "-k", "railway digital twin", "--depth", "2"]).unwrap();
        match cli.command {
            Command::Search { keywords, description, depth, limit, export_dir } => {
                assert_eq!(keywords, "railway digital twin");
                assert_eq!(description, "");
                assert_eq!(depth, Some(2));
                assert_eq!(limit, None);
                assert!(export_dir.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_search_requires_keywords() {
        assert!(Cli::try_parse_from(["blatt", "search"]).is_err());
    }
}
