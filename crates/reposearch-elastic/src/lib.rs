//! # reposearch-elastic
//!
//! Code and issue search against an Elasticsearch cluster over its REST API.
//!
//! Indices are created as `<name>.v<version>` behind an alias named after
//! the configured index, so a mapping change builds a fresh index and the
//! old versions are removed. Protocol v7 and v8 clusters differ only in
//! the media types sent with each request.

pub mod client;
pub mod code;
pub mod error;
pub mod issue;
pub mod query;

pub use client::{versioned_index, ElasticConfig, EsClient};
pub use code::{ElasticCodeIndexer, CODE_INDEX_VERSION};
pub use error::ElasticError;
pub use issue::{ElasticIssueIndexer, ISSUE_INDEX_VERSION};
