//! Directory-backed object store.
//!
//! Treats a working tree as a repository: a blob id is the path of a file
//! relative to the root.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use walkdir::WalkDir;

use reposearch_core::{Blob, BlobSession, ObjectError, ObjectStore};
use reposearch_types::{FileUpdate, RepoChanges};

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a blob id, refusing anything that leaves the root.
    fn resolve(&self, blob_id: &str) -> Result<PathBuf, ObjectError> {
        let relative = Path::new(blob_id);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(ObjectError::NotFound(blob_id.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Every regular file under the root as an update, skipping `.git`.
    pub fn collect_changes(&self) -> io::Result<RepoChanges> {
        let mut changes = RepoChanges::new();
        let walker = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.file_name() != ".git");
        for entry in walker {
            let entry = entry.map_err(io::Error::other)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let size = entry.metadata().map_err(io::Error::other)?.len();
            changes = changes.with_update(FileUpdate::new(name.clone(), name).with_size(size));
        }
        Ok(changes)
    }
}

fn not_found_or_io(blob_id: &str, err: io::Error) -> ObjectError {
    if err.kind() == io::ErrorKind::NotFound {
        ObjectError::NotFound(blob_id.to_string())
    } else {
        ObjectError::Io(err)
    }
}

struct FsSession {
    store: FsObjectStore,
}

#[async_trait]
impl BlobSession for FsSession {
    async fn read_blob(&mut self, blob_id: &str) -> Result<Blob, ObjectError> {
        let path = self.store.resolve(blob_id)?;
        let file = tokio::fs::File::open(&path)
            .await
            .map_err(|e| not_found_or_io(blob_id, e))?;
        let size = file.metadata().await?.len();
        Ok(Blob {
            size,
            reader: Box::new(file),
        })
    }

    async fn close(self: Box<Self>) {}
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn open_session(&self, _repo_id: i64) -> Result<Box<dyn BlobSession>, ObjectError> {
        Ok(Box::new(FsSession {
            store: self.clone(),
        }))
    }

    async fn blob_size(&self, _repo_id: i64, blob_id: &str) -> Result<u64, ObjectError> {
        let path = self.resolve(blob_id)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| not_found_or_io(blob_id, e))?;
        Ok(metadata.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join(".git/objects")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        fs::write(dir.path().join("README.md"), "# demo").unwrap();
        fs::write(dir.path().join(".git/HEAD"), "ref: refs/heads/main").unwrap();
        dir
    }

    #[test]
    fn test_collect_changes_skips_git() {
        let dir = tree();
        let changes = FsObjectStore::new(dir.path()).collect_changes().unwrap();
        let names: Vec<&str> = changes.updates.iter().map(|u| u.filename.as_str()).collect();
        assert_eq!(names, vec!["README.md", "src/main.rs"]);
        assert_eq!(changes.updates[1].size, Some(12));
        assert!(changes.removed_filenames.is_empty());
    }

    #[tokio::test]
    async fn test_read_and_size() {
        let dir = tree();
        let store = FsObjectStore::new(dir.path());
        assert_eq!(store.blob_size(1, "README.md").await.unwrap(), 6);

        let mut session = store.open_session(1).await.unwrap();
        let mut blob = session.read_blob("src/main.rs").await.unwrap();
        let mut content = String::new();
        blob.reader.read_to_string(&mut content).await.unwrap();
        assert_eq!(content, "fn main() {}");
        assert_eq!(blob.size, 12);

        assert!(matches!(
            session.read_blob("missing.rs").await,
            Err(ObjectError::NotFound(_))
        ));
        assert!(matches!(
            session.read_blob("../etc/passwd").await,
            Err(ObjectError::NotFound(_))
        ));
        session.close().await;
    }
}
