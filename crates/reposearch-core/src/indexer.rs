//! The contract every search backend implements.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use reposearch_types::{
    CodeSearchOptions, CodeSearchResults, IssueDocument, IssueSearchOptions, IssueSearchResults,
    RepoChanges, SearchMode,
};

use crate::error::IndexerError;
use crate::extract::ExtractStats;

/// Search modes a backend can answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    modes: &'static [SearchMode],
}

impl Capabilities {
    pub const fn new(modes: &'static [SearchMode]) -> Self {
        Self { modes }
    }

    /// Every mode, including regexp and native.
    pub const fn all() -> Self {
        Self::new(&SearchMode::ALL)
    }

    pub fn supports(&self, mode: SearchMode) -> bool {
        self.modes.contains(&mode)
    }

    pub fn modes(&self) -> &'static [SearchMode] {
        self.modes
    }

    /// Reject a mode this backend cannot answer.
    pub fn check(&self, mode: SearchMode, backend: &'static str) -> Result<(), IndexerError> {
        if self.supports(mode) {
            Ok(())
        } else {
            Err(IndexerError::UnsupportedMode { mode, backend })
        }
    }
}

/// A code search backend.
///
/// Implementations are shared by many concurrent callers; each call
/// completes its work before returning.
#[async_trait]
pub trait CodeIndexer: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    /// Prepare the index. Returns whether it already existed.
    async fn init(&self) -> Result<bool, IndexerError>;

    /// Liveness check.
    async fn ping(&self) -> Result<(), IndexerError>;

    async fn close(&self) -> Result<(), IndexerError>;

    /// Apply one push worth of changes to a repository.
    ///
    /// Updates are applied in order, then removals. `cancel` is checked
    /// before each file is read.
    async fn index(
        &self,
        cancel: &CancellationToken,
        repo_id: i64,
        commit_id: &str,
        changes: &RepoChanges,
    ) -> Result<ExtractStats, IndexerError>;

    /// Remove every document of a repository.
    async fn delete(&self, repo_id: i64) -> Result<(), IndexerError>;

    async fn search(&self, opts: &CodeSearchOptions) -> Result<CodeSearchResults, IndexerError>;
}

/// An issue search backend.
#[async_trait]
pub trait IssueIndexer: Send + Sync {
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    async fn init(&self) -> Result<bool, IndexerError>;

    async fn ping(&self) -> Result<(), IndexerError>;

    async fn close(&self) -> Result<(), IndexerError>;

    /// Insert or replace issues by id.
    async fn index(&self, issues: &[IssueDocument]) -> Result<(), IndexerError>;

    async fn delete(&self, ids: &[i64]) -> Result<(), IndexerError>;

    async fn search(&self, opts: &IssueSearchOptions) -> Result<IssueSearchResults, IndexerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_check() {
        const TEXT_ONLY: Capabilities =
            Capabilities::new(&[SearchMode::Exact, SearchMode::Words, SearchMode::Fuzzy]);

        assert!(TEXT_ONLY.check(SearchMode::Words, "test").is_ok());
        let err = TEXT_ONLY.check(SearchMode::Regexp, "test").unwrap_err();
        assert!(matches!(
            err,
            IndexerError::UnsupportedMode {
                mode: SearchMode::Regexp,
                backend: "test"
            }
        ));
        assert!(Capabilities::all().supports(SearchMode::Native));
    }
}
