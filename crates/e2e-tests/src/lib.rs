//! End-to-end test infrastructure for reposearch.
//!
//! Provides a shared TestHarness and helpers that drive every embedded
//! backend through the same scenarios, so the conformance suites can
//! assert identical behavior from each of them.

use std::path::PathBuf;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio_util::sync::CancellationToken;

use reposearch_core::{
    CodeIndexer, Collaborators, ExtractSettings, ExtractStats, Extractor, IndexerError,
    IssueIndexer, MemoryObjectStore,
};
use reposearch_sql::{SqlConfig, SqlIssueIndexer};
use reposearch_tantivy::{TantivyCodeIndexer, TantivyConfig, TantivyIssueIndexer};
use reposearch_trigram::{TrigramCodeIndexer, TrigramConfig};
use reposearch_types::{FileUpdate, IssueDocument, RepoChanges};

/// Code backends that run without an external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeBackend {
    Tantivy,
    Trigram,
}

impl CodeBackend {
    pub const ALL: [CodeBackend; 2] = [CodeBackend::Tantivy, CodeBackend::Trigram];
}

/// Issue backends that run without an external service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueBackend {
    Tantivy,
    Sql,
}

impl IssueBackend {
    pub const ALL: [IssueBackend; 2] = [IssueBackend::Tantivy, IssueBackend::Sql];
}

/// Shared test harness for E2E tests.
///
/// Owns a temp directory for index files and an in-memory object store
/// that plays the part of the repository.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub store: MemoryObjectStore,
    pub index_root: PathBuf,
}

impl TestHarness {
    /// Create a new test harness with a temp directory and an empty store.
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let index_root = temp_dir.path().join("indexes");
        std::fs::create_dir_all(&index_root).expect("Failed to create index dir");

        Self {
            _temp_dir: temp_dir,
            store: MemoryObjectStore::new(),
            index_root,
        }
    }

    pub fn extractor(&self, settings: ExtractSettings) -> Extractor {
        Extractor::new(
            Arc::new(self.store.clone()),
            Collaborators::default(),
            settings,
        )
    }

    /// Build a code indexer over this harness's store. Not initialized.
    pub fn code_indexer(
        &self,
        backend: CodeBackend,
        settings: ExtractSettings,
    ) -> Arc<dyn CodeIndexer> {
        let extractor = self.extractor(settings);
        match backend {
            CodeBackend::Tantivy => Arc::new(TantivyCodeIndexer::new(
                TantivyConfig::new(self.index_root.join("tantivy-code")).with_memory_mb(15),
                extractor,
            )),
            CodeBackend::Trigram => Arc::new(TrigramCodeIndexer::new(
                TrigramConfig::new(self.index_root.join("trigram")),
                extractor,
            )),
        }
    }

    /// Build and initialize a code indexer with default extraction rules.
    pub async fn open_code(&self, backend: CodeBackend) -> Arc<dyn CodeIndexer> {
        let indexer = self.code_indexer(backend, ExtractSettings::default());
        indexer
            .init()
            .await
            .unwrap_or_else(|e| panic!("{:?}: init failed: {}", backend, e));
        indexer
    }

    /// Build and initialize an issue indexer.
    pub async fn open_issues(&self, backend: IssueBackend) -> Arc<dyn IssueIndexer> {
        let indexer: Arc<dyn IssueIndexer> = match backend {
            IssueBackend::Tantivy => Arc::new(TantivyIssueIndexer::new(
                TantivyConfig::new(self.index_root.join("tantivy-issues")).with_memory_mb(15),
            )),
            IssueBackend::Sql => {
                let url = format!("sqlite://{}", self.index_root.join("issues.db").display());
                Arc::new(
                    SqlIssueIndexer::connect(&SqlConfig::new(url))
                        .expect("Failed to configure sql indexer"),
                )
            }
        };
        indexer
            .init()
            .await
            .unwrap_or_else(|e| panic!("{:?}: init failed: {}", backend, e));
        indexer
    }

    /// Store `files` as blobs and describe them as one push.
    pub fn changes(&self, repo_id: i64, files: &[(&str, &str)]) -> RepoChanges {
        let mut changes = RepoChanges::new();
        for (filename, content) in files {
            let blob_id = format!("{}:{}", repo_id, filename);
            self.store.insert(blob_id.clone(), content.as_bytes());
            changes = changes.with_update(FileUpdate::new(*filename, blob_id));
        }
        changes
    }

    /// Index `files` into `repo_id` at a fixed commit.
    pub async fn push(
        &self,
        indexer: &dyn CodeIndexer,
        repo_id: i64,
        files: &[(&str, &str)],
    ) -> Result<ExtractStats, IndexerError> {
        let changes = self.changes(repo_id, files);
        indexer
            .index(&CancellationToken::new(), repo_id, TEST_COMMIT, &changes)
            .await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

pub const TEST_COMMIT: &str = "5f0c7a1e";

/// The shared issue data set: 10 repositories with 20 issues each.
///
/// Every attribute cycles with a different period so each filter selects
/// a distinct, non-trivial subset. Issues come back in a seeded random
/// order, so backends never see them sorted by id.
pub fn generate_issues() -> Vec<IssueDocument> {
    let ids = |n: i64| (1..=n).collect::<Vec<i64>>();
    let mut issues = Vec::with_capacity(200);
    let mut id = 0;
    for repo_id in 1..=10 {
        for index in 1..=20 {
            id += 1;
            let comments: Vec<String> = (0..id % 4).map(|i| format!("comment{}", i)).collect();
            let label_ids = ids(id % 5);
            issues.push(IssueDocument {
                id,
                repo_id,
                is_public: repo_id % 2 == 0,
                title: format!("issue{} of repo{}", index, repo_id),
                content: format!("content{}", index),
                is_pull: index % 2 == 0,
                is_closed: index % 3 == 0,
                no_label: label_ids.is_empty(),
                label_ids,
                milestone_id: index % 4,
                project_id: index % 5,
                project_column_id: index % 6,
                poster_id: id % 10 + 1,
                assignee_id: index % 10,
                mention_ids: ids(id % 6),
                reviewed_ids: ids(id % 7),
                review_requested_ids: ids(id % 8),
                subscriber_ids: ids(id % 9),
                updated_unix: id + index,
                created_unix: id,
                deadline_unix: id + index + repo_id,
                comment_count: comments.len() as i64,
                comments,
            });
        }
    }
    issues.shuffle(&mut StdRng::seed_from_u64(0x5eed));
    issues
}
