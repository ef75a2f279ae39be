//! Search error types.

use reposearch_core::IndexerError;
use thiserror::Error;

/// Errors that can occur during index operations.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Tantivy index error
    #[error("Tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    /// Query parse error
    #[error("Query parse error: {0}")]
    QueryParse(#[from] tantivy::query::QueryParserError),

    /// Keyword could not be compiled into a query
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Schema mismatch
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Index writer is poisoned or held elsewhere
    #[error("Index is locked: {0}")]
    IndexLocked(String),

    /// Operation issued before `init`
    #[error("Index is not initialized")]
    NotInitialized,

    /// Metadata or aggregation (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Serialization(err.to_string())
    }
}

impl From<SearchError> for IndexerError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::QueryParse(e) => IndexerError::InvalidQuery(e.to_string()),
            SearchError::InvalidQuery(msg) => IndexerError::InvalidQuery(msg),
            SearchError::Io(e) => IndexerError::Io(e),
            SearchError::Serialization(msg) => IndexerError::Serialization(msg),
            other => IndexerError::Backend(other.to_string()),
        }
    }
}
