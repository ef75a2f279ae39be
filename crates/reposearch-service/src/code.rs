//! Code search service.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use reposearch_core::{CodeIndexer, Collaborators, ExtractStats, IndexerHolder, ObjectStore};
use reposearch_types::{CodeIndexerSettings, CodeSearchOptions, CodeSearchResults, RepoChanges};

use crate::backend::build_code_indexer;
use crate::error::ServiceError;

/// Entry point for indexing and searching repository content.
///
/// The backend is installed in the holder once `init` succeeds. Until
/// then, every other call waits up to the startup timeout.
pub struct CodeSearchService {
    indexer: Arc<dyn CodeIndexer>,
    holder: IndexerHolder<dyn CodeIndexer>,
    startup_timeout: Duration,
}

impl CodeSearchService {
    pub fn new(indexer: Arc<dyn CodeIndexer>, startup_timeout: Duration) -> Self {
        Self {
            indexer,
            holder: IndexerHolder::new(),
            startup_timeout,
        }
    }

    pub fn from_settings(
        settings: &CodeIndexerSettings,
        store: Arc<dyn ObjectStore>,
        collaborators: Collaborators,
    ) -> Result<Self, ServiceError> {
        let indexer = build_code_indexer(settings, store, collaborators)?;
        Ok(Self::new(
            indexer,
            Duration::from_secs(settings.startup_timeout_secs),
        ))
    }

    pub fn backend(&self) -> &'static str {
        self.indexer.name()
    }

    pub fn is_ready(&self) -> bool {
        self.holder.is_ready()
    }

    /// Prepare the backend and make it available to callers.
    ///
    /// Returns whether the index already existed. A new index means the
    /// caller has to populate it.
    pub async fn init(&self) -> Result<bool, ServiceError> {
        let start = Instant::now();
        info!(backend = self.backend(), "Initializing code indexer");
        match self.indexer.init().await {
            Ok(existed) => {
                self.holder.set(Some(self.indexer.clone()));
                info!(
                    backend = self.backend(),
                    existed,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Code indexer ready"
                );
                Ok(existed)
            }
            Err(e) => {
                error!(backend = self.backend(), error = %e, "Code indexer initialization failed");
                Err(e.into())
            }
        }
    }

    async fn ready(&self) -> Result<Arc<dyn CodeIndexer>, ServiceError> {
        self.holder
            .wait_timeout(self.startup_timeout)
            .await
            .ok_or(ServiceError::NotReady("code"))
    }

    pub async fn ping(&self) -> Result<(), ServiceError> {
        let indexer = self.holder.try_get().ok_or(ServiceError::NotReady("code"))?;
        Ok(indexer.ping().await?)
    }

    pub async fn index(
        &self,
        cancel: &CancellationToken,
        repo_id: i64,
        commit_id: &str,
        changes: &RepoChanges,
    ) -> Result<ExtractStats, ServiceError> {
        let indexer = self.ready().await?;
        let start = Instant::now();
        let stats = indexer.index(cancel, repo_id, commit_id, changes).await?;
        info!(
            repo_id,
            commit_id,
            indexed = stats.indexed,
            deleted = stats.deleted,
            skipped = stats.skipped,
            elapsed_ms = start.elapsed().as_millis(),
            "Indexed repository changes"
        );
        Ok(stats)
    }

    pub async fn delete(&self, repo_id: i64) -> Result<(), ServiceError> {
        let indexer = self.ready().await?;
        indexer.delete(repo_id).await?;
        info!(repo_id, "Removed repository from code index");
        Ok(())
    }

    /// Run a search. Backend failures surface as "search unavailable".
    pub async fn search(&self, opts: &CodeSearchOptions) -> Result<CodeSearchResults, ServiceError> {
        let indexer = self.ready().await?;
        indexer.capabilities().check(opts.mode(), indexer.name())?;
        match indexer.search(opts).await {
            Ok(results) => {
                debug!(
                    keyword = %opts.keyword,
                    total = results.total,
                    hits = results.hits.len(),
                    "Code search"
                );
                Ok(results)
            }
            Err(e) => {
                warn!(keyword = %opts.keyword, error = %e, "Code search failed");
                Err(ServiceError::SearchUnavailable(e))
            }
        }
    }

    pub async fn close(&self) -> Result<(), ServiceError> {
        if let Some(indexer) = self.holder.try_get() {
            indexer.close().await?;
            info!(backend = indexer.name(), "Closed code indexer");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reposearch_core::{Capabilities, IndexerError};
    use reposearch_types::SearchMode;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Backend whose searches fail with a connection error.
    #[derive(Default)]
    struct Unreachable {
        initialized: AtomicBool,
    }

    #[async_trait]
    impl CodeIndexer for Unreachable {
        fn name(&self) -> &'static str {
            "unreachable"
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::new(&[SearchMode::Exact, SearchMode::Words])
        }

        async fn init(&self) -> Result<bool, IndexerError> {
            self.initialized.store(true, Ordering::SeqCst);
            Ok(false)
        }

        async fn ping(&self) -> Result<(), IndexerError> {
            Err(IndexerError::Unavailable("connection refused".into()))
        }

        async fn close(&self) -> Result<(), IndexerError> {
            Ok(())
        }

        async fn index(
            &self,
            _cancel: &CancellationToken,
            _repo_id: i64,
            _commit_id: &str,
            _changes: &RepoChanges,
        ) -> Result<ExtractStats, IndexerError> {
            Ok(ExtractStats::default())
        }

        async fn delete(&self, _repo_id: i64) -> Result<(), IndexerError> {
            Ok(())
        }

        async fn search(&self, _opts: &CodeSearchOptions) -> Result<CodeSearchResults, IndexerError> {
            Err(IndexerError::Unavailable("connection refused".into()))
        }
    }

    fn service(timeout: Duration) -> CodeSearchService {
        CodeSearchService::new(Arc::new(Unreachable::default()), timeout)
    }

    #[tokio::test]
    async fn test_search_before_init_times_out() {
        let service = service(Duration::from_millis(20));
        let err = service.search(&CodeSearchOptions::new("foo")).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotReady("code")));
        assert!(matches!(service.ping().await, Err(ServiceError::NotReady(_))));
    }

    #[tokio::test]
    async fn test_search_waits_for_concurrent_init() {
        let service = Arc::new(service(Duration::from_secs(5)));
        let searcher = {
            let service = service.clone();
            tokio::spawn(async move { service.search(&CodeSearchOptions::new("foo")).await })
        };
        tokio::task::yield_now().await;
        assert!(!service.init().await.unwrap());
        assert!(service.is_ready());

        let err = searcher.await.unwrap().unwrap_err();
        assert!(matches!(err, ServiceError::SearchUnavailable(_)));
        assert_eq!(err.to_string(), "search unavailable");
    }

    #[tokio::test]
    async fn test_unsupported_mode_is_rejected_up_front() {
        let service = service(Duration::from_secs(1));
        service.init().await.unwrap();
        let err = service
            .search(&CodeSearchOptions::new("fo+").with_mode(SearchMode::Regexp))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Indexer(IndexerError::UnsupportedMode {
                mode: SearchMode::Regexp,
                backend: "unreachable"
            })
        ));
    }

    #[tokio::test]
    async fn test_ping_reports_backend_errors() {
        let service = service(Duration::from_secs(1));
        service.init().await.unwrap();
        assert!(matches!(
            service.ping().await,
            Err(ServiceError::Indexer(IndexerError::Unavailable(_)))
        ));
        service.close().await.unwrap();
    }
}
