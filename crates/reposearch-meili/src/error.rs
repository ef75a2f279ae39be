//! Meilisearch adapter error types.

use reposearch_core::IndexerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeiliError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status; `message` is the server's error message when it sent one
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// An asynchronous task finished in the failed or canceled state
    #[error("Task {uid} failed: {message}")]
    Task { uid: u64, message: String },

    #[error("Task {0} did not finish in time")]
    TaskTimeout(u64),

    #[error("Unexpected response: {0}")]
    Response(String),

    #[error("Invalid server url: {0}")]
    InvalidUrl(String),

    #[error("Server not healthy: {0}")]
    Unhealthy(String),
}

impl MeiliError {
    /// True for failures that mean the server could not be reached.
    pub fn is_connection(&self) -> bool {
        match self {
            MeiliError::Http(e) => e.is_connect() || e.is_timeout(),
            MeiliError::Status { status, .. } => matches!(status, 502..=504),
            MeiliError::Unhealthy(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for MeiliError {
    fn from(err: serde_json::Error) -> Self {
        MeiliError::Response(err.to_string())
    }
}

impl From<MeiliError> for IndexerError {
    fn from(err: MeiliError) -> Self {
        if err.is_connection() {
            return IndexerError::Unavailable(err.to_string());
        }
        match err {
            MeiliError::Status { status: 400, message } => IndexerError::InvalidQuery(message),
            MeiliError::Response(msg) => IndexerError::Serialization(msg),
            MeiliError::InvalidUrl(msg) => IndexerError::Config(msg),
            other => IndexerError::Backend(other.to_string()),
        }
    }
}
