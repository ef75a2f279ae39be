//! Bounded write buffer over a backend's native batch.
//!
//! Appending never flushes. `index` and `delete` report whether the
//! threshold has been reached and the caller runs `flush` as its own step,
//! so a failed flush is always returned to whoever owns the batch.

use async_trait::async_trait;
use tracing::debug;

use reposearch_types::CodeDocument;

use crate::error::IndexerError;

/// Native batch operations of a code backend.
#[async_trait]
pub trait BatchWriter: Send + Sync {
    type Batch: Send;

    fn new_batch(&self) -> Self::Batch;

    fn add_document(&self, batch: &mut Self::Batch, doc: CodeDocument)
        -> Result<(), IndexerError>;

    fn add_delete(
        &self,
        batch: &mut Self::Batch,
        repo_id: i64,
        filename: &str,
    ) -> Result<(), IndexerError>;

    /// Commit a batch. Everything in it is durable once this returns.
    async fn submit(&self, batch: Self::Batch) -> Result<(), IndexerError>;
}

/// Buffers operations and hands them to a [`BatchWriter`] in bounded chunks.
pub struct FlushingBatch<'w, W: BatchWriter + ?Sized> {
    writer: &'w W,
    batch: W::Batch,
    pending: usize,
    max_ops: usize,
    flushes: usize,
}

impl<'w, W: BatchWriter + ?Sized> FlushingBatch<'w, W> {
    pub fn new(writer: &'w W, max_ops: usize) -> Self {
        Self {
            batch: writer.new_batch(),
            writer,
            pending: 0,
            max_ops: max_ops.max(1),
            flushes: 0,
        }
    }

    /// Append a document. Returns true when the batch should be flushed.
    pub fn index(&mut self, doc: CodeDocument) -> Result<bool, IndexerError> {
        self.writer.add_document(&mut self.batch, doc)?;
        self.pending += 1;
        Ok(self.is_full())
    }

    /// Append a delete. Returns true when the batch should be flushed.
    pub fn delete(&mut self, repo_id: i64, filename: &str) -> Result<bool, IndexerError> {
        self.writer.add_delete(&mut self.batch, repo_id, filename)?;
        self.pending += 1;
        Ok(self.is_full())
    }

    pub fn is_full(&self) -> bool {
        self.pending >= self.max_ops
    }

    /// Operations waiting for the next flush.
    pub fn len(&self) -> usize {
        self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending == 0
    }

    /// Number of batches submitted so far.
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Submit pending operations and start a fresh batch.
    pub async fn flush(&mut self) -> Result<(), IndexerError> {
        if self.pending == 0 {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.batch, self.writer.new_batch());
        let ops = std::mem::take(&mut self.pending);
        self.writer.submit(batch).await?;
        self.flushes += 1;
        debug!(ops, flushes = self.flushes, "Flushed index batch");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum Op {
        Index(String),
        Delete(String),
    }

    /// Records submitted batches in memory.
    #[derive(Default)]
    pub(crate) struct RecordingWriter {
        pub submitted: Mutex<Vec<Vec<Op>>>,
        pub fail_submit: bool,
    }

    impl RecordingWriter {
        pub fn batches(&self) -> Vec<Vec<Op>> {
            self.submitted.lock().unwrap().clone()
        }

        pub fn ops(&self) -> Vec<Op> {
            self.batches().into_iter().flatten().collect()
        }
    }

    #[async_trait]
    impl BatchWriter for RecordingWriter {
        type Batch = Vec<Op>;

        fn new_batch(&self) -> Self::Batch {
            Vec::new()
        }

        fn add_document(
            &self,
            batch: &mut Self::Batch,
            doc: CodeDocument,
        ) -> Result<(), IndexerError> {
            batch.push(Op::Index(doc.id()));
            Ok(())
        }

        fn add_delete(
            &self,
            batch: &mut Self::Batch,
            repo_id: i64,
            filename: &str,
        ) -> Result<(), IndexerError> {
            batch.push(Op::Delete(reposearch_types::code_document_id(
                repo_id, filename,
            )));
            Ok(())
        }

        async fn submit(&self, batch: Self::Batch) -> Result<(), IndexerError> {
            if self.fail_submit {
                return Err(IndexerError::Backend("submit rejected".into()));
            }
            self.submitted.lock().unwrap().push(batch);
            Ok(())
        }
    }

    pub(crate) fn doc(repo_id: i64, filename: &str) -> CodeDocument {
        CodeDocument {
            repo_id,
            commit_id: "c0ffee".into(),
            filename: filename.into(),
            content: "x".into(),
            language: String::new(),
            updated_at: 0,
        }
    }

    #[tokio::test]
    async fn test_threshold_reported_not_flushed() {
        let writer = RecordingWriter::default();
        let mut batch = FlushingBatch::new(&writer, 2);

        assert!(!batch.index(doc(1, "a")).unwrap());
        assert!(batch.delete(1, "b").unwrap());
        assert!(writer.batches().is_empty());
        assert_eq!(batch.len(), 2);

        batch.flush().await.unwrap();
        assert!(batch.is_empty());
        assert_eq!(
            writer.batches(),
            vec![vec![Op::Index("1_a".into()), Op::Delete("1_b".into())]]
        );
    }

    #[tokio::test]
    async fn test_flush_empty_is_noop() {
        let writer = RecordingWriter::default();
        let mut batch = FlushingBatch::new(&writer, 4);
        batch.flush().await.unwrap();
        assert_eq!(batch.flushes(), 0);
        assert!(writer.batches().is_empty());
    }

    #[tokio::test]
    async fn test_flush_error_is_returned() {
        let writer = RecordingWriter {
            fail_submit: true,
            ..Default::default()
        };
        let mut batch = FlushingBatch::new(&writer, 1);
        assert!(batch.index(doc(1, "a")).unwrap());
        assert!(matches!(
            batch.flush().await,
            Err(IndexerError::Backend(_))
        ));
    }
}
