use blatt_common::BlattError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} returned HTTP {status}")]
    Status { provider: String, status: u16 },
    #[error("Malformed {provider} response: {message}")]
    Parse { provider: String, message: String },
    #[error("{provider} call timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },
    #[error(transparent)]
    Client(#[from] BlattError),
}

impl SourceError {
    pub fn parse(provider: &str, message: impl Into<String>) -> Self {
        SourceError::Parse { provider: provider.to_string(), message: message.into() }
    }
}
