//! Tantivy index management.
//!
//! Each index directory carries a `reposearch_meta.json` file with the
//! schema version it was built with. A missing or different version means
//! the directory is deleted and rebuilt from scratch.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tantivy::schema::Schema;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy};
use tracing::{debug, info, warn};

use reposearch_core::IndexerError;

use crate::error::SearchError;
use crate::schema::register_tokenizers;

/// Bump when the code schema or tokenizer changes.
pub const CODE_INDEX_VERSION: u32 = 1;

/// Bump when the issue schema changes.
pub const ISSUE_INDEX_VERSION: u32 = 1;

const META_FILE: &str = "reposearch_meta.json";

/// Default memory budget for IndexWriter (50MB)
const DEFAULT_WRITER_MEMORY_MB: usize = 50;

/// Default operations per write batch
const DEFAULT_BATCH_SIZE: usize = 16;

/// Embedded index configuration
#[derive(Debug, Clone)]
pub struct TantivyConfig {
    /// Path to index directory
    pub index_path: PathBuf,
    /// Memory budget for writer in MB
    pub writer_memory_mb: usize,
    /// Operations per write batch
    pub batch_size: usize,
}

impl TantivyConfig {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.writer_memory_mb = mb;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Create an IndexWriter with the configured memory budget
    pub fn writer(&self, index: &Index) -> Result<IndexWriter, SearchError> {
        let memory_budget = self.writer_memory_mb * 1024 * 1024;
        let writer = index.writer(memory_budget)?;
        debug!(memory_mb = self.writer_memory_mb, "Created index writer");
        Ok(writer)
    }
}

/// Create an IndexReader that is reloaded explicitly after each commit.
pub fn manual_reader(index: &Index) -> Result<IndexReader, SearchError> {
    let reader = index
        .reader_builder()
        .reload_policy(ReloadPolicy::Manual)
        .try_into()?;
    Ok(reader)
}

/// Run blocking index work on the tokio blocking pool.
pub(crate) async fn run_blocking<T, F>(work: F) -> Result<T, IndexerError>
where
    F: FnOnce() -> Result<T, SearchError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| IndexerError::Backend(format!("index task failed: {}", e)))?
        .map_err(IndexerError::from)
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexMeta {
    version: u32,
}

fn read_version(path: &Path) -> Option<u32> {
    let raw = fs::read_to_string(path.join(META_FILE)).ok()?;
    serde_json::from_str::<IndexMeta>(&raw)
        .ok()
        .map(|meta| meta.version)
}

/// Open the index at `path`, rebuilding it when its version differs.
///
/// Returns the index and whether an index of this version already existed.
pub fn open_versioned_index(
    path: &Path,
    version: u32,
    schema: &Schema,
) -> Result<(Index, bool), SearchError> {
    if path.join("meta.json").exists() {
        match read_version(path) {
            Some(found) if found == version => {
                debug!(path = ?path, version, "Opening existing index");
                let index = Index::open_in_dir(path)?;
                register_tokenizers(&index);
                return Ok((index, true));
            }
            found => {
                warn!(
                    path = ?path,
                    found = ?found,
                    expected = version,
                    "Index version mismatch, rebuilding"
                );
                fs::remove_dir_all(path)?;
            }
        }
    }

    info!(path = ?path, version, "Creating new index");
    fs::create_dir_all(path)?;
    let index = Index::create_in_dir(path, schema.clone())?;
    register_tokenizers(&index);
    fs::write(
        path.join(META_FILE),
        serde_json::to_vec(&IndexMeta { version })?,
    )?;
    Ok((index, false))
}
