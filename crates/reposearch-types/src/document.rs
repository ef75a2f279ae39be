//! Change sets and indexable documents.

use serde::{Deserialize, Serialize};

/// One changed path to (re)index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpdate {
    /// Path relative to the repository root
    pub filename: String,
    /// Object id of the blob at the indexed commit
    pub blob_id: String,
    /// Blob size in bytes, `None` when the caller did not resolve it
    #[serde(default)]
    pub size: Option<u64>,
}

impl FileUpdate {
    pub fn new(filename: impl Into<String>, blob_id: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            blob_id: blob_id.into(),
            size: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

/// The incremental unit of indexing work for one push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoChanges {
    #[serde(default)]
    pub updates: Vec<FileUpdate>,
    #[serde(default)]
    pub removed_filenames: Vec<String>,
}

impl RepoChanges {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_update(mut self, update: FileUpdate) -> Self {
        self.updates.push(update);
        self
    }

    pub fn with_removed(mut self, filename: impl Into<String>) -> Self {
        self.removed_filenames.push(filename.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.removed_filenames.is_empty()
    }
}

/// Key of a code document: `{repo_id}_{filename}`.
pub fn code_document_id(repo_id: i64, filename: &str) -> String {
    format!("{}_{}", repo_id, filename)
}

/// A file's content as stored in a code index.
///
/// Keyed by `(repo_id, filename)` and overwritten wholesale on update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeDocument {
    pub repo_id: i64,
    pub commit_id: String,
    pub filename: String,
    pub content: String,
    pub language: String,
    /// Unix seconds at which the document was produced
    pub updated_at: i64,
}

impl CodeDocument {
    pub fn id(&self) -> String {
        code_document_id(self.repo_id, &self.filename)
    }
}

/// An issue or pull request as stored in an issue index.
///
/// Keyed by the globally unique `id`. Id fields use 0 for "none".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDocument {
    pub id: i64,
    pub repo_id: i64,
    pub is_public: bool,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub comments: Vec<String>,

    pub is_pull: bool,
    pub is_closed: bool,
    #[serde(default)]
    pub label_ids: Vec<i64>,
    pub no_label: bool,
    pub milestone_id: i64,
    pub project_id: i64,
    pub project_column_id: i64,
    pub poster_id: i64,
    pub assignee_id: i64,
    #[serde(default)]
    pub mention_ids: Vec<i64>,
    #[serde(default)]
    pub reviewed_ids: Vec<i64>,
    #[serde(default)]
    pub review_requested_ids: Vec<i64>,
    #[serde(default)]
    pub subscriber_ids: Vec<i64>,

    pub updated_unix: i64,
    pub created_unix: i64,
    pub deadline_unix: i64,
    pub comment_count: i64,
}
