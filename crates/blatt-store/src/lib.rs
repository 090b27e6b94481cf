//! Blatt Storage Layer
//!
//! Persists papers, citation edges, per-session scores and session history
//! in an embedded SQLite database.
//!
//! # Example
//!
//! ```rust,no_run
//! use blatt_store::{PaperStore, SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SqliteStore::open("./data/blatt.db")?;
//!     let recent = store.list_sessions(20).await?;
//!     println!("{} sessions", recent.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod migrations;
pub mod sqlite;
pub mod store;

pub use error::{Result, StoreError};
pub use sqlite::SqliteStore;
pub use store::PaperStore;
