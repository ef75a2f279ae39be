//! On-disk shard format.
//!
//! A repository is stored as one or more shard files followed by a JSON
//! metadata file. Every shard starts with a fixed header:
//!
//! ```text
//! magic "RSTG" | version u32 | repo_id i64 | doc_count u32
//! ```
//!
//! followed by `doc_count` records of
//! `filename | commit_id | language | updated_at i64 | content`, where every
//! string is a u32 byte length and the UTF-8 bytes. All integers are little
//! endian. Trigram postings are not stored; they are rebuilt on load.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use reposearch_types::CodeDocument;

use crate::error::TrigramError;

pub const MAGIC: [u8; 4] = *b"RSTG";

/// Bump when the shard layout or the matching rules change.
pub const INDEX_VERSION: u32 = 1;

const HEADER_LEN: usize = 4 + 4 + 8 + 4;

/// Metadata written after a repository's shards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoMeta {
    pub version: u32,
    pub repo_id: i64,
    pub shards: usize,
    pub documents: usize,
}

pub fn shard_path(dir: &Path, repo_id: i64, shard: usize) -> PathBuf {
    dir.join(format!("{}_v{}.{:05}.shard", repo_id, INDEX_VERSION, shard))
}

pub fn meta_path(dir: &Path, repo_id: i64) -> PathBuf {
    dir.join(format!("{}_v{}.meta.json", repo_id, INDEX_VERSION))
}

fn put_str(buf: &mut Vec<u8>, value: &str) {
    buf.extend(&(value.len() as u32).to_le_bytes());
    buf.extend(value.as_bytes());
}

fn record_len(doc: &CodeDocument) -> usize {
    4 * 4 + 8 + doc.filename.len() + doc.commit_id.len() + doc.language.len() + doc.content.len()
}

/// Encode `docs` into shard buffers of at most `max_bytes` each.
///
/// A document larger than `max_bytes` gets a shard of its own.
pub fn encode_shards(repo_id: i64, docs: &[CodeDocument], max_bytes: usize) -> Vec<Vec<u8>> {
    let mut groups: Vec<Vec<&CodeDocument>> = Vec::new();
    let mut current: Vec<&CodeDocument> = Vec::new();
    let mut current_len = HEADER_LEN;
    for doc in docs {
        let len = record_len(doc);
        if !current.is_empty() && current_len + len > max_bytes {
            groups.push(std::mem::take(&mut current));
            current_len = HEADER_LEN;
        }
        current.push(doc);
        current_len += len;
    }
    if !current.is_empty() {
        groups.push(current);
    }

    groups
        .into_iter()
        .map(|group| {
            let mut buf = Vec::with_capacity(HEADER_LEN + group.iter().map(|d| record_len(d)).sum::<usize>());
            buf.extend(&MAGIC);
            buf.extend(&INDEX_VERSION.to_le_bytes());
            buf.extend(&repo_id.to_le_bytes());
            buf.extend(&(group.len() as u32).to_le_bytes());
            for doc in group {
                put_str(&mut buf, &doc.filename);
                put_str(&mut buf, &doc.commit_id);
                put_str(&mut buf, &doc.language);
                buf.extend(&doc.updated_at.to_le_bytes());
                put_str(&mut buf, &doc.content);
            }
            buf
        })
        .collect()
}

struct Cursor<'a> {
    path: &'a Path,
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn corrupt(&self, reason: impl Into<String>) -> TrigramError {
        TrigramError::Corrupt {
            path: self.path.display().to_string(),
            reason: reason.into(),
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], TrigramError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| self.corrupt(format!("truncated at byte {}", self.pos)))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn u32(&mut self) -> Result<u32, TrigramError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    fn i64(&mut self) -> Result<i64, TrigramError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(raw))
    }

    fn string(&mut self) -> Result<String, TrigramError> {
        let len = self.u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| self.corrupt("string is not valid UTF-8"))
    }
}

/// Decode one shard, checking it belongs to `repo_id`.
pub fn decode_shard(path: &Path, buf: &[u8], repo_id: i64) -> Result<Vec<CodeDocument>, TrigramError> {
    let mut cursor = Cursor { path, buf, pos: 0 };
    if cursor.take(4)? != MAGIC {
        return Err(cursor.corrupt("bad magic"));
    }
    let version = cursor.u32()?;
    if version != INDEX_VERSION {
        return Err(cursor.corrupt(format!("version {} != {}", version, INDEX_VERSION)));
    }
    let found = cursor.i64()?;
    if found != repo_id {
        return Err(cursor.corrupt(format!("repo {} != {}", found, repo_id)));
    }

    let count = cursor.u32()? as usize;
    let mut docs = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let filename = cursor.string()?;
        let commit_id = cursor.string()?;
        let language = cursor.string()?;
        let updated_at = cursor.i64()?;
        let content = cursor.string()?;
        docs.push(CodeDocument {
            repo_id,
            commit_id,
            filename,
            content,
            language,
            updated_at,
        });
    }
    if cursor.pos != buf.len() {
        return Err(cursor.corrupt("trailing bytes"));
    }
    Ok(docs)
}
