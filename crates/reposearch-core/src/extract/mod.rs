//! Content extraction pipeline.
//!
//! Turns one `RepoChanges` set into document and delete operations on a
//! [`FlushingBatch`]. Every file goes through the same steps:
//! path gating, size resolution, a read through the call's shared blob
//! session, text sniffing, charset conversion and language detection.

mod collab;
mod language;
mod memory;
mod text;
mod vendor;

use std::sync::Arc;

use globset::{Glob, GlobSet, GlobSetBuilder};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reposearch_types::{CodeDocument, CodeIndexerSettings, FileUpdate, RepoChanges};

use crate::batch::{BatchWriter, FlushingBatch};
use crate::error::{IndexerError, ObjectError};

pub use collab::{
    Blob, BlobSession, Charset, LanguageClassifier, ObjectStore, PathClassifier, TextSniffer,
};
pub use language::ExtensionClassifier;
pub use memory::MemoryObjectStore;
pub use text::{LossyUtf8, NulByteSniffer};
pub use vendor::HeuristicPathClassifier;

/// Classification collaborators used while extracting content.
#[derive(Clone)]
pub struct Collaborators {
    pub languages: Arc<dyn LanguageClassifier>,
    pub paths: Arc<dyn PathClassifier>,
    pub sniffer: Arc<dyn TextSniffer>,
    pub charset: Arc<dyn Charset>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            languages: Arc::new(ExtensionClassifier),
            paths: Arc::new(HeuristicPathClassifier::new()),
            sniffer: Arc::new(NulByteSniffer),
            charset: Arc::new(LossyUtf8),
        }
    }
}

/// Limits and path rules applied by the pipeline.
#[derive(Debug, Clone)]
pub struct ExtractSettings {
    pub max_file_size: u64,
    pub exclude_vendored: bool,
    include: Option<GlobSet>,
    exclude: Option<GlobSet>,
}

impl Default for ExtractSettings {
    fn default() -> Self {
        Self {
            max_file_size: 1024 * 1024,
            exclude_vendored: true,
            include: None,
            exclude: None,
        }
    }
}

fn build_globs(patterns: &[String]) -> Result<Option<GlobSet>, IndexerError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| IndexerError::Config(format!("invalid glob {:?}: {}", pattern, e)))?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|e| IndexerError::Config(e.to_string()))?;
    Ok(Some(set))
}

impl ExtractSettings {
    pub fn new(max_file_size: u64, exclude_vendored: bool) -> Self {
        Self {
            max_file_size,
            exclude_vendored,
            include: None,
            exclude: None,
        }
    }

    pub fn with_include_patterns(mut self, patterns: &[String]) -> Result<Self, IndexerError> {
        self.include = build_globs(patterns)?;
        Ok(self)
    }

    pub fn with_exclude_patterns(mut self, patterns: &[String]) -> Result<Self, IndexerError> {
        self.exclude = build_globs(patterns)?;
        Ok(self)
    }

    pub fn from_settings(settings: &CodeIndexerSettings) -> Result<Self, IndexerError> {
        Self::new(settings.max_file_size, settings.exclude_vendored)
            .with_include_patterns(&settings.include_patterns)?
            .with_exclude_patterns(&settings.exclude_patterns)
    }

    /// Whether the include/exclude globs admit a path.
    pub fn is_indexable(&self, path: &str) -> bool {
        if let Some(include) = &self.include {
            if !include.is_match(path) {
                return false;
            }
        }
        match &self.exclude {
            Some(exclude) => !exclude.is_match(path),
            None => true,
        }
    }
}

/// Counters for one extraction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    /// Documents appended
    pub indexed: usize,
    /// Deletes appended, including oversized files
    pub deleted: usize,
    /// Files skipped by path rules, sniffing or missing objects
    pub skipped: usize,
}

enum Outcome {
    Indexed,
    Deleted,
    Skipped,
}

/// Runs the extraction steps for one repository push.
pub struct Extractor {
    store: Arc<dyn ObjectStore>,
    collaborators: Collaborators,
    settings: ExtractSettings,
}

impl Extractor {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        collaborators: Collaborators,
        settings: ExtractSettings,
    ) -> Self {
        Self {
            store,
            collaborators,
            settings,
        }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn settings(&self) -> &ExtractSettings {
        &self.settings
    }

    /// Append the operations for `changes` to `batch`.
    ///
    /// Flushes whenever the batch reports full. The caller flushes the
    /// remainder once this returns. On cancellation, what was already
    /// appended is flushed before `Cancelled` is returned.
    pub async fn extract<W>(
        &self,
        cancel: &CancellationToken,
        repo_id: i64,
        commit_id: &str,
        changes: &RepoChanges,
        batch: &mut FlushingBatch<'_, W>,
    ) -> Result<ExtractStats, IndexerError>
    where
        W: BatchWriter + ?Sized,
    {
        let mut stats = ExtractStats::default();

        if !changes.updates.is_empty() {
            let mut session = self.store.open_session(repo_id).await?;
            let result = self
                .extract_updates(
                    cancel,
                    repo_id,
                    commit_id,
                    &changes.updates,
                    session.as_mut(),
                    batch,
                    &mut stats,
                )
                .await;
            session.close().await;
            result?;
        }

        for filename in &changes.removed_filenames {
            if batch.delete(repo_id, filename)? {
                batch.flush().await?;
            }
            stats.deleted += 1;
        }

        info!(
            repo_id,
            commit_id,
            indexed = stats.indexed,
            deleted = stats.deleted,
            skipped = stats.skipped,
            "Extracted repository changes"
        );
        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    async fn extract_updates<W>(
        &self,
        cancel: &CancellationToken,
        repo_id: i64,
        commit_id: &str,
        updates: &[FileUpdate],
        session: &mut dyn BlobSession,
        batch: &mut FlushingBatch<'_, W>,
        stats: &mut ExtractStats,
    ) -> Result<(), IndexerError>
    where
        W: BatchWriter + ?Sized,
    {
        for update in updates {
            if cancel.is_cancelled() {
                batch.flush().await?;
                warn!(repo_id, filename = %update.filename, "Indexing cancelled");
                return Err(IndexerError::Cancelled);
            }

            match self
                .extract_update(repo_id, commit_id, update, session, batch)
                .await?
            {
                Outcome::Indexed => stats.indexed += 1,
                Outcome::Deleted => stats.deleted += 1,
                Outcome::Skipped => stats.skipped += 1,
            }

            if batch.is_full() {
                batch.flush().await?;
            }
        }
        Ok(())
    }

    async fn extract_update<W>(
        &self,
        repo_id: i64,
        commit_id: &str,
        update: &FileUpdate,
        session: &mut dyn BlobSession,
        batch: &mut FlushingBatch<'_, W>,
    ) -> Result<Outcome, IndexerError>
    where
        W: BatchWriter + ?Sized,
    {
        let filename = update.filename.as_str();

        if !self.settings.is_indexable(filename) {
            debug!(filename, "Skipping path outside include/exclude rules");
            return Ok(Outcome::Skipped);
        }

        if self.settings.exclude_vendored
            && (self.collaborators.paths.is_vendor(filename)
                || self.collaborators.paths.is_generated(filename))
        {
            debug!(filename, "Skipping vendored or generated path");
            return Ok(Outcome::Skipped);
        }

        let size = match update.size {
            Some(size) => size,
            None => match self.store.blob_size(repo_id, &update.blob_id).await {
                Ok(size) => size,
                Err(ObjectError::NotFound(blob)) => {
                    warn!(filename, blob = %blob, "Blob not found, skipping");
                    return Ok(Outcome::Skipped);
                }
                Err(e) => return Err(e.into()),
            },
        };

        if size > self.settings.max_file_size {
            return self.remove_oversized(repo_id, filename, size, batch);
        }

        let blob = match session.read_blob(&update.blob_id).await {
            Ok(blob) => blob,
            Err(ObjectError::NotFound(blob)) => {
                warn!(filename, blob = %blob, "Blob not found, skipping");
                return Ok(Outcome::Skipped);
            }
            Err(e) => return Err(e.into()),
        };

        // a declared size may be stale
        if blob.size > self.settings.max_file_size {
            return self.remove_oversized(repo_id, filename, blob.size, batch);
        }
        let limit = self.settings.max_file_size.saturating_add(1);
        let mut content = Vec::with_capacity(blob.size as usize);
        blob.reader
            .take(limit)
            .read_to_end(&mut content)
            .await
            .map_err(ObjectError::Io)?;
        if content.len() as u64 > self.settings.max_file_size {
            return self.remove_oversized(repo_id, filename, content.len() as u64, batch);
        }

        if !self.collaborators.sniffer.is_text(&content) {
            debug!(filename, "Skipping non-text content");
            return Ok(Outcome::Skipped);
        }

        let content = self.collaborators.charset.to_canonical(&content);
        let language = self.collaborators.languages.classify(filename, &content);

        batch.index(CodeDocument {
            repo_id,
            commit_id: commit_id.to_string(),
            filename: filename.to_string(),
            content,
            language,
            updated_at: chrono::Utc::now().timestamp(),
        })?;
        Ok(Outcome::Indexed)
    }

    fn remove_oversized<W>(
        &self,
        repo_id: i64,
        filename: &str,
        size: u64,
        batch: &mut FlushingBatch<'_, W>,
    ) -> Result<Outcome, IndexerError>
    where
        W: BatchWriter + ?Sized,
    {
        debug!(
            filename,
            size,
            max = self.settings.max_file_size,
            "File exceeds size limit, removing from index"
        );
        batch.delete(repo_id, filename)?;
        Ok(Outcome::Deleted)
    }
}
