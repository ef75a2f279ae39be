//! # reposearch-sql
//!
//! Issue search over plain SQL tables, for deployments without a search
//! engine. Keywords match as case-insensitive substrings of the title,
//! body and comments; there is no relevance ranking.

pub mod error;
pub mod issue;
pub mod query;

pub use error::SqlError;
pub use issue::{SqlConfig, SqlIssueIndexer};
