//! blatt-sources: Bibliographic source adapters and candidate aggregation.
//! Covers:
//! - Semantic Scholar, arXiv and CrossRef clients behind one `PaperSource` trait
//! - Per-adapter rate limiting with server-directed backoff
//! - Multi-query fan-out with deduplication and source routing

pub mod error;
pub mod rate_limit;
pub mod sources;
pub mod dedup;
pub mod aggregator;

pub use aggregator::{Aggregation, CandidateAggregator};
pub use error::SourceError;
pub use rate_limit::{RateLimiter, RetryPolicy};
pub use sources::{ArxivClient, CrossRefClient, PaperSource, SemanticScholarClient, SourceRegistry};
