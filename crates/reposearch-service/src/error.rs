//! Service error types.

use reposearch_core::IndexerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// A search reached the backend and failed
    #[error("search unavailable")]
    SearchUnavailable(#[source] IndexerError),

    /// No indexer was installed within the startup timeout
    #[error("search unavailable: {0} indexer is not ready")]
    NotReady(&'static str),

    /// The indexer is switched off in settings
    #[error("{0} indexer is disabled")]
    Disabled(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Indexer(#[from] IndexerError),
}

impl ServiceError {
    /// True when a search could not be answered at all.
    pub fn is_search_unavailable(&self) -> bool {
        matches!(self, ServiceError::SearchUnavailable(_) | ServiceError::NotReady(_))
    }
}
