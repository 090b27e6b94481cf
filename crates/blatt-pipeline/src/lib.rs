//! blatt-pipeline: the search pipeline.
//! Covers:
//! - Hard-requirement gate (avoid terms, concept coverage tiers)
//! - Budgeted citation graph expansion from top-tier seeds
//! - Batched oracle scoring with post-processing caps
//! - The convergence controller that runs a session end to end

pub mod controller;
pub mod events;
pub mod expander;
pub mod gate;
pub mod scorer;

pub use controller::{ConvergenceController, OutcomeStats, PipelineError, RunOptions, SearchOutcome};
pub use events::{EventSink, PipelineEvent};
pub use expander::{CitationExpander, Expansion, ExpansionBudget, ExpansionStats};
pub use gate::{GateVerdict, GuardOutcome, HardRequirementGate};
pub use scorer::{Scorer, ScoringMode, ScoringReport};
