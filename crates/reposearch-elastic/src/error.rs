//! Elasticsearch adapter error types.

use reposearch_core::IndexerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ElasticError {
    /// Transport failure (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The cluster answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// A bulk request reported per-item failures
    #[error("Bulk request failed: {0}")]
    Bulk(String),

    /// The response did not have the expected shape
    #[error("Unexpected response: {0}")]
    Response(String),

    #[error("Invalid cluster url: {0}")]
    InvalidUrl(String),

    /// The cluster did not report healthy within the startup timeout
    #[error("Cluster not healthy: {0}")]
    Unhealthy(String),
}

impl ElasticError {
    /// True for failures that mean the cluster could not be reached.
    pub fn is_connection(&self) -> bool {
        match self {
            ElasticError::Http(e) => e.is_connect() || e.is_timeout(),
            ElasticError::Status { status, .. } => matches!(status, 502..=504),
            ElasticError::Unhealthy(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for ElasticError {
    fn from(err: serde_json::Error) -> Self {
        ElasticError::Response(err.to_string())
    }
}

impl From<ElasticError> for IndexerError {
    fn from(err: ElasticError) -> Self {
        if err.is_connection() {
            return IndexerError::Unavailable(err.to_string());
        }
        match err {
            ElasticError::Status { status: 400, body } => IndexerError::InvalidQuery(body),
            ElasticError::Response(msg) => IndexerError::Serialization(msg),
            ElasticError::InvalidUrl(msg) => IndexerError::Config(msg),
            other => IndexerError::Backend(other.to_string()),
        }
    }
}
