//! blatt-llm: LLM backends and everything that consults them: relevance
//! scoring, score post-processing, query translation and citation typing.

pub mod backend;
pub mod json;
pub mod oracle;
pub mod postprocess;
pub mod relationships;
pub mod translator;

pub use backend::{build_backend, LlmBackend, LlmError, LlmRequest, LlmResponse, Message};
pub use oracle::{LlmRelevanceOracle, NullOracle, OracleError, RelevanceOracle, UserIntent, Verdict};
pub use postprocess::{post_process, PostProcessRules};
pub use relationships::{Classification, RelationshipClassifier};
pub use translator::QueryTranslator;
