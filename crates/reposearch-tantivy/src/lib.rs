//! # reposearch-tantivy
//!
//! Embedded code and issue search using Tantivy.
//!
//! ## Features
//! - Versioned on-disk index directories, rebuilt when the schema version changes
//! - Code tokenizer splitting identifiers on non-alphanumeric characters
//! - Exact, words, fuzzy, term-level regexp and Tantivy query syntax searches
//! - Language facets through a terms aggregation on a fast field
//! - Blocking index work runs on the tokio blocking pool

pub mod code;
pub mod document;
pub mod error;
pub mod index;
pub mod issue;
pub mod query;
pub mod schema;

pub use code::TantivyCodeIndexer;
pub use error::SearchError;
pub use index::{open_versioned_index, TantivyConfig, CODE_INDEX_VERSION, ISSUE_INDEX_VERSION};
pub use issue::TantivyIssueIndexer;
pub use schema::{build_code_schema, build_issue_schema, CodeSchema, IssueSchema};
