//! # reposearch-service
//!
//! Indexing service facade over the search backends.
//!
//! - `backend`: builds the indexer named in settings
//! - `CodeSearchService` / `IssueSearchService`: gate calls on `init`,
//!   log each operation and report failed searches as "search unavailable"

pub mod backend;
pub mod code;
pub mod error;
pub mod issue;

pub use backend::{build_code_indexer, build_issue_indexer};
pub use code::CodeSearchService;
pub use error::ServiceError;
pub use issue::IssueSearchService;
