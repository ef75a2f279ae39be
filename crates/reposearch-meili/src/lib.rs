//! # reposearch-meili
//!
//! Code and issue search against a Meilisearch server.
//!
//! Indexes are named `<name>_v<version>`; older versions are deleted when
//! a new one is created. Writes are asynchronous tasks on the server and
//! every write here waits for its task before returning. Totals are
//! always estimates, and regular expressions are not supported.

pub mod client;
pub mod code;
pub mod error;
pub mod issue;
pub mod query;

pub use client::{versioned_uid, MeiliClient, MeiliConfig};
pub use code::{meili_document_id, MeiliCodeIndexer, CODE_INDEX_VERSION};
pub use error::MeiliError;
pub use issue::{MeiliIssueIndexer, ISSUE_INDEX_VERSION};
