//! In-memory object store.
//!
//! Blobs are addressed by id alone, the way content-addressed stores are.

use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use super::collab::{Blob, BlobSession, ObjectStore};
use crate::error::ObjectError;

#[derive(Default)]
struct Inner {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    broken: RwLock<HashSet<String>>,
    sessions: AtomicUsize,
}

/// Object store backed by a hash map.
#[derive(Clone, Default)]
pub struct MemoryObjectStore {
    inner: Arc<Inner>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, blob_id: impl Into<String>, content: impl Into<Vec<u8>>) {
        self.inner
            .blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(blob_id.into(), content.into());
    }

    /// Make reads of `blob_id` fail with an IO error.
    pub fn insert_broken(&self, blob_id: impl Into<String>) {
        self.inner
            .broken
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(blob_id.into());
    }

    /// Number of read sessions opened so far.
    pub fn sessions_opened(&self) -> usize {
        self.inner.sessions.load(Ordering::SeqCst)
    }

    fn lookup(&self, blob_id: &str) -> Result<Vec<u8>, ObjectError> {
        if self
            .inner
            .broken
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(blob_id)
        {
            return Err(ObjectError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("read session failed on {}", blob_id),
            )));
        }
        self.inner
            .blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(blob_id)
            .cloned()
            .ok_or_else(|| ObjectError::NotFound(blob_id.to_string()))
    }
}

struct MemorySession {
    store: MemoryObjectStore,
}

#[async_trait]
impl BlobSession for MemorySession {
    async fn read_blob(&mut self, blob_id: &str) -> Result<Blob, ObjectError> {
        let content = self.store.lookup(blob_id)?;
        Ok(Blob {
            size: content.len() as u64,
            reader: Box::new(Cursor::new(content)),
        })
    }

    async fn close(self: Box<Self>) {}
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn open_session(&self, _repo_id: i64) -> Result<Box<dyn BlobSession>, ObjectError> {
        self.inner.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            store: self.clone(),
        }))
    }

    async fn blob_size(&self, _repo_id: i64, blob_id: &str) -> Result<u64, ObjectError> {
        self.lookup(blob_id).map(|c| c.len() as u64)
    }
}
