//! Issue search service.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use reposearch_core::{IndexerHolder, IssueIndexer};
use reposearch_types::{IssueDocument, IssueIndexerSettings, IssueSearchOptions, IssueSearchResults};

use crate::backend::build_issue_indexer;
use crate::error::ServiceError;

pub struct IssueSearchService {
    indexer: Arc<dyn IssueIndexer>,
    holder: IndexerHolder<dyn IssueIndexer>,
    startup_timeout: Duration,
}

impl IssueSearchService {
    pub fn new(indexer: Arc<dyn IssueIndexer>, startup_timeout: Duration) -> Self {
        Self {
            indexer,
            holder: IndexerHolder::new(),
            startup_timeout,
        }
    }

    pub fn from_settings(settings: &IssueIndexerSettings) -> Result<Self, ServiceError> {
        Ok(Self::new(
            build_issue_indexer(settings)?,
            Duration::from_secs(settings.startup_timeout_secs),
        ))
    }

    pub fn backend(&self) -> &'static str {
        self.indexer.name()
    }

    pub fn is_ready(&self) -> bool {
        self.holder.is_ready()
    }

    pub async fn init(&self) -> Result<bool, ServiceError> {
        let start = Instant::now();
        match self.indexer.init().await {
            Ok(existed) => {
                self.holder.set(Some(self.indexer.clone()));
                info!(
                    backend = self.backend(),
                    existed,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Issue indexer ready"
                );
                Ok(existed)
            }
            Err(e) => {
                error!(backend = self.backend(), error = %e, "Issue indexer initialization failed");
                Err(e.into())
            }
        }
    }

    async fn ready(&self) -> Result<Arc<dyn IssueIndexer>, ServiceError> {
        self.holder
            .wait_timeout(self.startup_timeout)
            .await
            .ok_or(ServiceError::NotReady("issue"))
    }

    pub async fn ping(&self) -> Result<(), ServiceError> {
        let indexer = self.holder.try_get().ok_or(ServiceError::NotReady("issue"))?;
        Ok(indexer.ping().await?)
    }

    pub async fn index(&self, issues: &[IssueDocument]) -> Result<(), ServiceError> {
        let indexer = self.ready().await?;
        indexer.index(issues).await?;
        debug!(count = issues.len(), "Indexed issues");
        Ok(())
    }

    pub async fn delete(&self, ids: &[i64]) -> Result<(), ServiceError> {
        let indexer = self.ready().await?;
        indexer.delete(ids).await?;
        debug!(count = ids.len(), "Removed issues from index");
        Ok(())
    }

    pub async fn search(
        &self,
        opts: &IssueSearchOptions,
    ) -> Result<IssueSearchResults, ServiceError> {
        let indexer = self.ready().await?;
        indexer.capabilities().check(opts.mode(), indexer.name())?;
        indexer.search(opts).await.map_err(|e| {
            warn!(keyword = %opts.keyword, error = %e, "Issue search failed");
            ServiceError::SearchUnavailable(e)
        })
    }

    pub async fn close(&self) -> Result<(), ServiceError> {
        if let Some(indexer) = self.holder.try_get() {
            indexer.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_tantivy_issue_round_trip_through_service() {
        let dir = TempDir::new().unwrap();
        let service = IssueSearchService::from_settings(&IssueIndexerSettings {
            path: dir.path().to_string_lossy().to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(service.backend(), "tantivy");
        assert!(!service.init().await.unwrap());

        service
            .index(&[
                IssueDocument {
                    id: 1,
                    repo_id: 1,
                    title: "Crash when pushing".into(),
                    ..Default::default()
                },
                IssueDocument {
                    id: 2,
                    repo_id: 1,
                    title: "Add dark theme".into(),
                    ..Default::default()
                },
            ])
            .await
            .unwrap();

        let results = service.search(&IssueSearchOptions::new("crash")).await.unwrap();
        assert_eq!(results.ids(), vec![1]);

        service.delete(&[1]).await.unwrap();
        let results = service.search(&IssueSearchOptions::new("crash")).await.unwrap();
        assert_eq!(results.total, 0);
        service.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_not_ready_without_init() {
        let dir = TempDir::new().unwrap();
        let settings = IssueIndexerSettings {
            path: dir.path().to_string_lossy().to_string(),
            startup_timeout_secs: 0,
            ..Default::default()
        };
        let service = IssueSearchService::from_settings(&settings).unwrap();
        let err = service.search(&IssueSearchOptions::new("x")).await.unwrap_err();
        assert!(err.is_search_unavailable());
    }
}
