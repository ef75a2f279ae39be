//! # reposearch-trigram
//!
//! Code search over sharded, trigram-prefiltered repository snapshots.
//!
//! Every repository is kept in memory as a filename-ordered document list
//! with trigram postings, and persisted as size-bounded shard files plus a
//! metadata file. Searches prefilter candidates with the postings and
//! verify each one against the keyword, so exact mode is a true substring
//! match and regexp mode matches across token boundaries.

pub mod error;
pub mod indexer;
pub mod native;
pub mod repo;
pub mod search;
pub mod shard;

pub use error::TrigramError;
pub use indexer::{TrigramCodeIndexer, TrigramConfig};
pub use native::NativeQuery;
pub use shard::INDEX_VERSION;
