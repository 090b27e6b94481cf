//! Storage error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection mutex poisoned")]
    Poisoned,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt row in {table}: {message}")]
    Decode { table: &'static str, message: String },
}
