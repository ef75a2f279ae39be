//! SQL backend error types.

use reposearch_core::IndexerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlError {
    /// Driver or database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid database url: {0}")]
    InvalidUrl(String),
}

impl From<SqlError> for IndexerError {
    fn from(err: SqlError) -> Self {
        match err {
            SqlError::Database(
                e @ (sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed),
            ) => IndexerError::Unavailable(e.to_string()),
            SqlError::InvalidUrl(msg) => IndexerError::Config(msg),
            other => IndexerError::Backend(other.to_string()),
        }
    }
}
