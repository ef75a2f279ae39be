//! Code indexer over sharded trigram files.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use reposearch_core::{
    BatchWriter, Capabilities, CodeIndexer, ExtractStats, Extractor, FlushingBatch, IndexerError,
    Keyword,
};
use reposearch_types::{
    CodeDocument, CodeIndexerSettings, CodeSearchOptions, CodeSearchResults, Paginator,
    RepoChanges,
};

use crate::error::TrigramError;
use crate::repo::RepoIndex;
use crate::search::{scan, Matcher, Scan};
use crate::shard::{decode_shard, encode_shards, meta_path, shard_path, RepoMeta, INDEX_VERSION};

const MARKER_FILE: &str = "reposearch_trigram.json";

/// Trigram index configuration
#[derive(Debug, Clone)]
pub struct TrigramConfig {
    pub index_path: PathBuf,
    /// Upper bound on the size of one shard file
    pub shard_max_bytes: usize,
    pub batch_size: usize,
}

impl TrigramConfig {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            shard_max_bytes: 64 * 1024 * 1024,
            batch_size: 16,
        }
    }

    pub fn from_settings(settings: &CodeIndexerSettings) -> Self {
        Self {
            index_path: PathBuf::from(&settings.path),
            shard_max_bytes: settings.shard_max_bytes as usize,
            batch_size: settings.batch_size,
        }
    }

    pub fn with_shard_max_bytes(mut self, bytes: usize) -> Self {
        self.shard_max_bytes = bytes;
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Marker {
    version: u32,
}

/// Kind of a file written by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexFile {
    Meta,
    Shard,
}

/// Parse `<repo_id>_v<version>.meta.json` and `<repo_id>_v<version>.<nnnnn>.shard`.
fn parse_index_file(name: &str) -> Option<(i64, u32, IndexFile)> {
    let (repo, rest) = name.split_once("_v")?;
    let repo_id = repo.parse::<i64>().ok()?;
    let (version, tail) = rest.split_once('.')?;
    let version = version.parse::<u32>().ok()?;
    let kind = if tail == "meta.json" {
        IndexFile::Meta
    } else {
        let ordinal = tail.strip_suffix(".shard")?;
        if ordinal.len() != 5 || !ordinal.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        IndexFile::Shard
    };
    Some((repo_id, version, kind))
}

/// One buffered write.
#[derive(Debug)]
pub enum TrigramOp {
    Upsert(CodeDocument),
    Delete { repo_id: i64, filename: String },
}

/// Code search over repositories held in memory and persisted as shards.
pub struct TrigramCodeIndexer {
    config: TrigramConfig,
    extractor: Extractor,
    repos: RwLock<Option<HashMap<i64, RepoIndex>>>,
}

impl TrigramCodeIndexer {
    pub fn new(config: TrigramConfig, extractor: Extractor) -> Self {
        Self {
            config,
            extractor,
            repos: RwLock::new(None),
        }
    }

    fn dir(&self) -> &Path {
        &self.config.index_path
    }

    async fn read_marker(&self) -> Option<u32> {
        let raw = fs::read(self.dir().join(MARKER_FILE)).await.ok()?;
        serde_json::from_slice::<Marker>(&raw).ok().map(|m| m.version)
    }

    /// Remove index files that were not written by this index version.
    async fn remove_stale_files(&self, keep_current: bool) -> Result<usize, TrigramError> {
        let mut removed = 0;
        let mut entries = fs::read_dir(self.dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some((_, version, _)) = parse_index_file(&name) else {
                continue;
            };
            if version != INDEX_VERSION || !keep_current {
                fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn load_repo(&self, repo_id: i64) -> Result<RepoIndex, TrigramError> {
        let path = meta_path(self.dir(), repo_id);
        let meta: RepoMeta = serde_json::from_slice(&fs::read(&path).await?)?;
        if meta.version != INDEX_VERSION || meta.repo_id != repo_id {
            return Err(TrigramError::Corrupt {
                path: path.display().to_string(),
                reason: format!("metadata for repo {} v{}", meta.repo_id, meta.version),
            });
        }
        let mut docs = Vec::with_capacity(meta.documents);
        for shard in 0..meta.shards {
            let path = shard_path(self.dir(), repo_id, shard);
            let buf = fs::read(&path).await?;
            docs.extend(decode_shard(&path, &buf, repo_id)?);
        }
        Ok(RepoIndex::new(docs))
    }

    async fn load_all(&self) -> Result<HashMap<i64, RepoIndex>, TrigramError> {
        let mut repo_ids = Vec::new();
        let mut entries = fs::read_dir(self.dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some((repo_id, INDEX_VERSION, IndexFile::Meta)) = parse_index_file(&name) {
                repo_ids.push(repo_id);
            }
        }

        let mut repos = HashMap::new();
        for repo_id in repo_ids {
            match self.load_repo(repo_id).await {
                Ok(repo) => {
                    debug!(repo_id, documents = repo.len(), "Loaded repository shards");
                    repos.insert(repo_id, repo);
                }
                Err(e) => {
                    warn!(repo_id, error = %e, "Dropping unreadable repository shards");
                    self.remove_repo_files(repo_id).await?;
                }
            }
        }
        Ok(repos)
    }

    async fn remove_repo_files(&self, repo_id: i64) -> Result<(), TrigramError> {
        let mut entries = fs::read_dir(self.dir()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if parse_index_file(&name).is_some_and(|(id, _, _)| id == repo_id) {
                fs::remove_file(entry.path()).await?;
            }
        }
        Ok(())
    }

    /// Rewrite a repository's shards and metadata.
    async fn persist_repo(&self, repo_id: i64, repo: &RepoIndex) -> Result<(), TrigramError> {
        if repo.is_empty() {
            return self.remove_repo_files(repo_id).await;
        }

        // the metadata goes last so a crash mid-write leaves the old one
        let shards = encode_shards(repo_id, repo.docs(), self.config.shard_max_bytes);
        for (n, bytes) in shards.iter().enumerate() {
            let path = shard_path(self.dir(), repo_id, n);
            let tmp = path.with_extension("shard.tmp");
            fs::write(&tmp, bytes).await?;
            fs::rename(&tmp, &path).await?;
        }
        let meta = RepoMeta {
            version: INDEX_VERSION,
            repo_id,
            shards: shards.len(),
            documents: repo.len(),
        };
        let path = meta_path(self.dir(), repo_id);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&meta)?).await?;
        fs::rename(&tmp, &path).await?;

        // drop shards left over from a larger previous write
        let mut extra = shards.len();
        loop {
            let path = shard_path(self.dir(), repo_id, extra);
            match fs::remove_file(&path).await {
                Ok(()) => extra += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
                Err(e) => return Err(e.into()),
            }
        }
        debug!(repo_id, shards = shards.len(), documents = repo.len(), "Persisted repository");
        Ok(())
    }
}

#[async_trait]
impl BatchWriter for TrigramCodeIndexer {
    type Batch = Vec<TrigramOp>;

    fn new_batch(&self) -> Self::Batch {
        Vec::new()
    }

    fn add_document(&self, batch: &mut Self::Batch, doc: CodeDocument) -> Result<(), IndexerError> {
        batch.push(TrigramOp::Upsert(doc));
        Ok(())
    }

    fn add_delete(
        &self,
        batch: &mut Self::Batch,
        repo_id: i64,
        filename: &str,
    ) -> Result<(), IndexerError> {
        batch.push(TrigramOp::Delete {
            repo_id,
            filename: filename.to_string(),
        });
        Ok(())
    }

    async fn submit(&self, batch: Self::Batch) -> Result<(), IndexerError> {
        let mut grouped: BTreeMap<i64, (Vec<CodeDocument>, Vec<String>)> = BTreeMap::new();
        for op in batch {
            match op {
                TrigramOp::Upsert(doc) => grouped.entry(doc.repo_id).or_default().0.push(doc),
                TrigramOp::Delete { repo_id, filename } => {
                    grouped.entry(repo_id).or_default().1.push(filename)
                }
            }
        }

        let mut guard = self.repos.write().await;
        let repos = guard.as_mut().ok_or(TrigramError::NotInitialized)?;
        for (repo_id, (upserts, deletes)) in grouped {
            let repo = repos.entry(repo_id).or_default();
            repo.apply(upserts, &deletes);
            self.persist_repo(repo_id, repo).await?;
            if repo.is_empty() {
                repos.remove(&repo_id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CodeIndexer for TrigramCodeIndexer {
    fn name(&self) -> &'static str {
        "trigram"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn init(&self) -> Result<bool, IndexerError> {
        fs::create_dir_all(self.dir()).await?;
        let existed = self.read_marker().await == Some(INDEX_VERSION);
        let removed = self.remove_stale_files(existed).await?;
        if removed > 0 {
            warn!(path = ?self.dir(), removed, "Removed stale trigram index files");
        }
        if !existed {
            let marker = serde_json::to_vec(&Marker {
                version: INDEX_VERSION,
            })
            .map_err(TrigramError::from)?;
            fs::write(self.dir().join(MARKER_FILE), marker).await?;
        }

        let repos = self.load_all().await?;
        info!(path = ?self.dir(), existed, repositories = repos.len(), "Trigram index ready");
        *self.repos.write().await = Some(repos);
        Ok(existed)
    }

    async fn ping(&self) -> Result<(), IndexerError> {
        match self.repos.read().await.as_ref() {
            Some(_) => Ok(()),
            None => Err(TrigramError::NotInitialized.into()),
        }
    }

    async fn close(&self) -> Result<(), IndexerError> {
        self.repos.write().await.take();
        Ok(())
    }

    async fn index(
        &self,
        cancel: &CancellationToken,
        repo_id: i64,
        commit_id: &str,
        changes: &RepoChanges,
    ) -> Result<ExtractStats, IndexerError> {
        let mut batch = FlushingBatch::new(self, self.config.batch_size);
        let stats = self
            .extractor
            .extract(cancel, repo_id, commit_id, changes, &mut batch)
            .await?;
        batch.flush().await?;
        Ok(stats)
    }

    async fn delete(&self, repo_id: i64) -> Result<(), IndexerError> {
        let mut guard = self.repos.write().await;
        let repos = guard.as_mut().ok_or(TrigramError::NotInitialized)?;
        repos.remove(&repo_id);
        self.remove_repo_files(repo_id).await?;
        info!(repo_id, "Deleted repository from trigram index");
        Ok(())
    }

    async fn search(&self, opts: &CodeSearchOptions) -> Result<CodeSearchResults, IndexerError> {
        let mode = opts.mode();
        self.capabilities().check(mode, self.name())?;
        let keyword = Keyword::parse(&opts.keyword, mode);
        let matcher = Matcher::compile(keyword.as_ref())?;
        let (offset, limit) = Paginator::window(opts.paginator.as_ref());

        let guard = self.repos.read().await;
        let repos = guard.as_ref().ok_or(TrigramError::NotInitialized)?;
        let results = scan(
            repos,
            &matcher,
            &Scan {
                repo_ids: &opts.repo_ids,
                language: opts.language_filter(),
                offset,
                limit,
            },
            self.extractor.collaborators().languages.as_ref(),
        );
        debug!(total = results.total, hits = results.hits.len(), "Trigram search complete");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use reposearch_core::{Collaborators, ExtractSettings, MemoryObjectStore};
    use reposearch_types::{FileUpdate, SearchMode};
    use tempfile::TempDir;

    fn indexer(dir: &TempDir, store: &MemoryObjectStore) -> TrigramCodeIndexer {
        let extractor = Extractor::new(
            Arc::new(store.clone()),
            Collaborators::default(),
            ExtractSettings::default(),
        );
        TrigramCodeIndexer::new(
            TrigramConfig::new(dir.path()).with_shard_max_bytes(256),
            extractor,
        )
    }

    async fn push(indexer: &TrigramCodeIndexer, store: &MemoryObjectStore, repo_id: i64, files: &[(&str, &str)]) {
        let mut changes = RepoChanges::new();
        for (filename, content) in files {
            let blob = format!("{}:{}", repo_id, filename);
            store.insert(blob.clone(), content.as_bytes());
            changes = changes.with_update(FileUpdate::new(*filename, blob));
        }
        indexer
            .index(&CancellationToken::new(), repo_id, "c0ffee", &changes)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_index_and_search_exact_span() {
        let dir = TempDir::new().unwrap();
        let store = MemoryObjectStore::new();
        let indexer = indexer(&dir, &store);
        assert!(!indexer.init().await.unwrap());

        push(&indexer, &store, 1, &[("a.js", "function Foo() {}")]).await;
        let results = indexer.search(&CodeSearchOptions::new("Foo")).await.unwrap();
        assert_eq!(results.total, 1);
        assert_eq!((results.hits[0].start_index, results.hits[0].end_index), (9, 12));
        assert_eq!(results.hits[0].language, "JavaScript");
    }

    #[tokio::test]
    async fn test_persisted_across_reopen() {
        let dir = TempDir::new().unwrap();
        let store = MemoryObjectStore::new();
        {
            let indexer = indexer(&dir, &store);
            indexer.init().await.unwrap();
            let files: Vec<(String, String)> = (0..6)
                .map(|i| (format!("f{}.rs", i), format!("fn item_{}() {{ {} }}", i, "x".repeat(80))))
                .collect();
            let refs: Vec<(&str, &str)> = files.iter().map(|(f, c)| (f.as_str(), c.as_str())).collect();
            push(&indexer, &store, 5, &refs).await;
            indexer.close().await.unwrap();
        }
        assert!(shard_path(dir.path(), 5, 1).exists());

        let indexer = indexer(&dir, &store);
        assert!(indexer.init().await.unwrap());
        let results = indexer.search(&CodeSearchOptions::new("item_")).await.unwrap();
        assert_eq!(results.total, 6);
    }

    #[test]
    fn test_parse_index_file() {
        assert_eq!(parse_index_file("12_v1.meta.json"), Some((12, 1, IndexFile::Meta)));
        assert_eq!(parse_index_file("-3_v2.00004.shard"), Some((-3, 2, IndexFile::Shard)));
        assert_eq!(parse_index_file("12_v1.4.shard"), None);
        assert_eq!(parse_index_file("12_v1.00000.shard.tmp"), None);
        assert_eq!(parse_index_file("reposearch_trigram.json"), None);
    }

    #[tokio::test]
    async fn test_stale_versions_removed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("3_v0.00000.shard"), b"old").unwrap();
        std::fs::write(dir.path().join("3_v0.meta.json"), b"{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        let store = MemoryObjectStore::new();
        let indexer = indexer(&dir, &store);
        assert!(!indexer.init().await.unwrap());
        assert!(!dir.path().join("3_v0.00000.shard").exists());
        assert!(!dir.path().join("3_v0.meta.json").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_removals_and_repo_delete() {
        let dir = TempDir::new().unwrap();
        let store = MemoryObjectStore::new();
        let indexer = indexer(&dir, &store);
        indexer.init().await.unwrap();

        push(&indexer, &store, 1, &[("a.go", "package alpha"), ("b.go", "package beta")]).await;
        push(&indexer, &store, 2, &[("c.go", "package gamma")]).await;

        indexer
            .index(&CancellationToken::new(), 1, "c1", &RepoChanges::new().with_removed("a.go"))
            .await
            .unwrap();
        let results = indexer.search(&CodeSearchOptions::new("package")).await.unwrap();
        assert_eq!(results.total, 2);

        indexer.delete(2).await.unwrap();
        assert!(!meta_path(dir.path(), 2).exists());
        let results = indexer.search(&CodeSearchOptions::new("gamma")).await.unwrap();
        assert_eq!(results.total, 0);
    }

    #[tokio::test]
    async fn test_regexp_over_content() {
        let dir = TempDir::new().unwrap();
        let store = MemoryObjectStore::new();
        let indexer = indexer(&dir, &store);
        indexer.init().await.unwrap();
        push(&indexer, &store, 1, &[("a.py", "answer = 42\n")]).await;

        let results = indexer
            .search(&CodeSearchOptions::new(r"answer\s*=\s*\d+").with_mode(SearchMode::Regexp))
            .await
            .unwrap();
        assert_eq!(results.total, 1);
        assert_eq!((results.hits[0].start_index, results.hits[0].end_index), (0, 11));

        let invalid = indexer
            .search(&CodeSearchOptions::new("(").with_mode(SearchMode::Regexp))
            .await;
        assert!(matches!(invalid, Err(IndexerError::InvalidQuery(_))));
    }
}
