//! # reposearch-types
//!
//! Shared domain types for the reposearch indexing engine.
//!
//! This crate defines the data structures passed between the extraction
//! pipeline, the backend adapters and the service facade:
//! - Changes: `FileUpdate` and `RepoChanges`, the unit of incremental work
//! - Documents: `CodeDocument` and `IssueDocument`
//! - Search: options, modes, pagination and normalized results
//! - Settings: layered configuration

pub mod config;
pub mod document;
pub mod error;
pub mod search;

pub use config::{
    CodeEngine, CodeIndexerSettings, ElasticFlavor, IssueEngine, IssueIndexerSettings, Settings,
};
pub use document::{code_document_id, CodeDocument, FileUpdate, IssueDocument, RepoChanges};
pub use error::ConfigError;
pub use search::{
    effective_mode, CodeSearchOptions, CodeSearchResults, IssueMatch, IssueSearchOptions,
    IssueSearchResults, IssueSortBy, Paginator, SearchMode, SearchResult, SearchResultLanguages,
    MAX_RESULT_WINDOW,
};
