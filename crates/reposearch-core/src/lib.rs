//! # reposearch-core
//!
//! Backend-agnostic core of the reposearch indexing engine.
//!
//! ## Contents
//! - `CodeIndexer` / `IssueIndexer`: the contract every backend implements
//! - `IndexerHolder`: readiness gate handing one shared indexer to many callers
//! - `FlushingBatch`: bounded write buffer over a backend's native batch
//! - `extract`: turns a `RepoChanges` set into document and delete operations
//! - `query`: keyword interpretation and the backend-neutral issue filter tree
//! - `normalize`: match spans and language facets shared by every adapter
//! - `Availability`: liveness flag kept by remote adapters

pub mod availability;
pub mod batch;
pub mod error;
pub mod extract;
pub mod holder;
pub mod indexer;
pub mod normalize;
pub mod query;

#[cfg(feature = "noop")]
pub mod noop;

pub use availability::Availability;
pub use batch::{BatchWriter, FlushingBatch};
pub use error::{IndexerError, ObjectError};
pub use extract::{
    Blob, BlobSession, Charset, Collaborators, ExtensionClassifier, ExtractSettings, ExtractStats,
    Extractor, HeuristicPathClassifier, LanguageClassifier, LossyUtf8, MemoryObjectStore,
    NulByteSniffer, ObjectStore, PathClassifier, TextSniffer,
};
pub use holder::IndexerHolder;
pub use indexer::{Capabilities, CodeIndexer, IssueIndexer};
pub use query::{Filter, IssueField, Keyword};
