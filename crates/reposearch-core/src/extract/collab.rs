//! Collaborators consumed by the extraction pipeline.
//!
//! The object store, language detection and text sniffing live outside
//! this crate. Default heuristics are provided in sibling modules.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::ObjectError;

/// Detects the programming language of a file.
pub trait LanguageClassifier: Send + Sync {
    /// Language name, or an empty string when unknown.
    fn classify(&self, filename: &str, content: &str) -> String;

    /// Display color of a language, as `#rrggbb`.
    fn color(&self, language: &str) -> Option<String>;
}

/// Recognizes third-party and machine-generated paths.
pub trait PathClassifier: Send + Sync {
    fn is_vendor(&self, path: &str) -> bool;

    fn is_generated(&self, path: &str) -> bool;
}

/// Decides whether raw bytes are text.
pub trait TextSniffer: Send + Sync {
    fn is_text(&self, content: &[u8]) -> bool;
}

/// Converts raw bytes into canonical UTF-8.
///
/// Bytes that cannot be converted are dropped, never reported.
pub trait Charset: Send + Sync {
    fn to_canonical(&self, content: &[u8]) -> String;
}

/// One blob returned by a read session.
pub struct Blob {
    pub size: u64,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}

/// A batched read session, opened once per indexing call.
#[async_trait]
pub trait BlobSession: Send {
    async fn read_blob(&mut self, blob_id: &str) -> Result<Blob, ObjectError>;

    async fn close(self: Box<Self>);
}

/// Repository object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn open_session(&self, repo_id: i64) -> Result<Box<dyn BlobSession>, ObjectError>;

    /// Size-only lookup for updates whose size was not resolved by the caller.
    async fn blob_size(&self, repo_id: i64, blob_id: &str) -> Result<u64, ObjectError>;
}
