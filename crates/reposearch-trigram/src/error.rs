//! Trigram index error types.

use reposearch_core::IndexerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrigramError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A shard or metadata file failed to decode
    #[error("Corrupt index file {path}: {reason}")]
    Corrupt { path: String, reason: String },

    /// Keyword could not be compiled
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Metadata (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation issued before `init`
    #[error("Index is not initialized")]
    NotInitialized,
}

impl From<regex::Error> for TrigramError {
    fn from(err: regex::Error) -> Self {
        TrigramError::InvalidQuery(err.to_string())
    }
}

impl From<TrigramError> for IndexerError {
    fn from(err: TrigramError) -> Self {
        match err {
            TrigramError::Io(e) => IndexerError::Io(e),
            TrigramError::InvalidQuery(msg) => IndexerError::InvalidQuery(msg),
            TrigramError::Serialization(e) => IndexerError::Serialization(e.to_string()),
            other => IndexerError::Backend(other.to_string()),
        }
    }
}
