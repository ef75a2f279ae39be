//! Indexers that accept every write and never match.
//!
//! Only compiled with the `noop` feature, for deployments that keep the
//! indexing hooks wired but do not want a search backend.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use reposearch_types::{
    CodeSearchOptions, CodeSearchResults, IssueDocument, IssueSearchOptions, IssueSearchResults,
    RepoChanges,
};

use crate::error::IndexerError;
use crate::extract::ExtractStats;
use crate::indexer::{Capabilities, CodeIndexer, IssueIndexer};

#[derive(Debug, Default)]
pub struct NoopCodeIndexer;

#[async_trait]
impl CodeIndexer for NoopCodeIndexer {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn init(&self) -> Result<bool, IndexerError> {
        Ok(true)
    }

    async fn ping(&self) -> Result<(), IndexerError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), IndexerError> {
        Ok(())
    }

    async fn index(
        &self,
        _cancel: &CancellationToken,
        _repo_id: i64,
        _commit_id: &str,
        changes: &RepoChanges,
    ) -> Result<ExtractStats, IndexerError> {
        Ok(ExtractStats {
            skipped: changes.updates.len() + changes.removed_filenames.len(),
            ..Default::default()
        })
    }

    async fn delete(&self, _repo_id: i64) -> Result<(), IndexerError> {
        Ok(())
    }

    async fn search(&self, _opts: &CodeSearchOptions) -> Result<CodeSearchResults, IndexerError> {
        Ok(CodeSearchResults::default())
    }
}

#[derive(Debug, Default)]
pub struct NoopIssueIndexer;

#[async_trait]
impl IssueIndexer for NoopIssueIndexer {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn init(&self) -> Result<bool, IndexerError> {
        Ok(true)
    }

    async fn ping(&self) -> Result<(), IndexerError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), IndexerError> {
        Ok(())
    }

    async fn index(&self, _issues: &[IssueDocument]) -> Result<(), IndexerError> {
        Ok(())
    }

    async fn delete(&self, _ids: &[i64]) -> Result<(), IndexerError> {
        Ok(())
    }

    async fn search(
        &self,
        _opts: &IssueSearchOptions,
    ) -> Result<IssueSearchResults, IndexerError> {
        Ok(IssueSearchResults::default())
    }
}
