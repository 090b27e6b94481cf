//! Data model shared by every pipeline stage.

pub mod paper;
pub mod score;
pub mod concept;
pub mod session;

pub use concept::{relaxed_concepts, sanitize_concepts, split_keywords, Concept, ConceptLevel, SearchQuery, Translation};
pub use paper::{normalize_title, Paper, Relationship, RelationshipType, SourceKind};
pub use score::{DomainMatch, RankedPaper, Score, LOWEST_VISIBLE_PRIORITY, TOP_PRIORITY};
pub use session::{PipelineStage, SearchSession, SessionError, SessionStatus};
