//! blatt-common: Shared types, errors and configuration used across all Blatt crates.

pub mod error;
pub mod models;
pub mod config;
pub mod sandbox;

// Re-export commonly used types
pub use config::BlattConfig;
pub use error::{BlattError, Result};
pub use models::{
    Concept, ConceptLevel, DomainMatch, Paper, PipelineStage, RankedPaper, Relationship,
    RelationshipType, Score, SearchQuery, SearchSession, SessionStatus, SourceKind, Translation,
};
