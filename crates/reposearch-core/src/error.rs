//! Indexer error types.

use reposearch_types::SearchMode;
use thiserror::Error;

/// Errors reported by the object store collaborator.
#[derive(Debug, Error)]
pub enum ObjectError {
    /// The blob does not exist; the file is skipped
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The read session failed; the rest of the call is aborted
    #[error("Object store IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur in any indexer operation.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// The backend could not be reached
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The backend rejected or failed the request
    #[error("Backend error: {0}")]
    Backend(String),

    /// The keyword could not be turned into a query
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The active backend cannot answer this search mode
    #[error("Search mode {mode} is not supported by the {backend} backend")]
    UnsupportedMode {
        mode: SearchMode,
        backend: &'static str,
    },

    /// Object store failure during extraction
    #[error("Object store error: {0}")]
    ObjectStore(#[from] ObjectError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The caller cancelled the operation
    #[error("Indexing cancelled")]
    Cancelled,

    /// The indexer was closed
    #[error("Indexer is closed")]
    Closed,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IndexerError {
    /// True for connection-class failures.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, IndexerError::Unavailable(_))
    }
}
