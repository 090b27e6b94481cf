//! blatt-test-utils: fixtures shared by the workspace's test suites.
//!
//! Everything here is deterministic: mocks replay scripted data and record
//! the calls they receive so tests can assert on them.

pub mod fixtures;
pub mod mock_llm;
pub mod mock_source;
pub mod status_server;

pub use fixtures::{paper, PaperBuilder};
pub use mock_llm::{ScriptedBackend, ScriptedOracle};
pub use mock_source::MockSource;
pub use status_server::StatusServer;
