//! Backend selection from settings.

use std::sync::Arc;

use tracing::info;

use reposearch_core::{
    CodeIndexer, Collaborators, ExtractSettings, Extractor, IndexerError, IssueIndexer,
    ObjectStore,
};
use reposearch_elastic::{ElasticCodeIndexer, ElasticConfig, ElasticIssueIndexer};
use reposearch_meili::{MeiliCodeIndexer, MeiliConfig, MeiliIssueIndexer};
use reposearch_sql::{SqlConfig, SqlIssueIndexer};
use reposearch_tantivy::{TantivyCodeIndexer, TantivyConfig, TantivyIssueIndexer};
use reposearch_trigram::{TrigramCodeIndexer, TrigramConfig};
use reposearch_types::{CodeEngine, CodeIndexerSettings, IssueEngine, IssueIndexerSettings};

use crate::error::ServiceError;

/// Build the code indexer named by `settings.engine`.
///
/// Nothing is opened or contacted here; that happens in `init`.
pub fn build_code_indexer(
    settings: &CodeIndexerSettings,
    store: Arc<dyn ObjectStore>,
    collaborators: Collaborators,
) -> Result<Arc<dyn CodeIndexer>, ServiceError> {
    if !settings.enabled {
        return Err(ServiceError::Disabled("code"));
    }
    settings.validate().map_err(ServiceError::Config)?;

    let extractor = Extractor::new(store, collaborators, ExtractSettings::from_settings(settings)?);
    let indexer: Arc<dyn CodeIndexer> = match settings.engine {
        CodeEngine::Tantivy => Arc::new(TantivyCodeIndexer::new(
            TantivyConfig::new(&settings.path)
                .with_memory_mb(settings.writer_memory_mb)
                .with_batch_size(settings.batch_size),
            extractor,
        )),
        CodeEngine::Elasticsearch => Arc::new(
            ElasticCodeIndexer::new(ElasticConfig::from_code_settings(settings), extractor)
                .map_err(IndexerError::from)?,
        ),
        CodeEngine::Meilisearch => Arc::new(
            MeiliCodeIndexer::new(MeiliConfig::from_code_settings(settings), extractor)
                .map_err(IndexerError::from)?,
        ),
        CodeEngine::Trigram => Arc::new(TrigramCodeIndexer::new(
            TrigramConfig::from_settings(settings),
            extractor,
        )),
        CodeEngine::Noop => noop_code()?,
    };
    info!(engine = indexer.name(), "Selected code search backend");
    Ok(indexer)
}

/// Build the issue indexer named by `settings.engine`.
pub fn build_issue_indexer(
    settings: &IssueIndexerSettings,
) -> Result<Arc<dyn IssueIndexer>, ServiceError> {
    if !settings.enabled {
        return Err(ServiceError::Disabled("issue"));
    }
    settings.validate().map_err(ServiceError::Config)?;

    let indexer: Arc<dyn IssueIndexer> = match settings.engine {
        IssueEngine::Tantivy => Arc::new(TantivyIssueIndexer::new(
            TantivyConfig::new(&settings.path).with_memory_mb(settings.writer_memory_mb),
        )),
        IssueEngine::Elasticsearch => Arc::new(
            ElasticIssueIndexer::new(ElasticConfig::from_issue_settings(settings))
                .map_err(IndexerError::from)?,
        ),
        IssueEngine::Meilisearch => Arc::new(
            MeiliIssueIndexer::new(MeiliConfig::from_issue_settings(settings))
                .map_err(IndexerError::from)?,
        ),
        IssueEngine::Sql => Arc::new(
            SqlIssueIndexer::connect(&SqlConfig::from_settings(settings))
                .map_err(IndexerError::from)?,
        ),
        IssueEngine::Noop => noop_issue()?,
    };
    info!(engine = indexer.name(), "Selected issue search backend");
    Ok(indexer)
}

#[cfg(feature = "noop")]
fn noop_code() -> Result<Arc<dyn CodeIndexer>, ServiceError> {
    Ok(Arc::new(reposearch_core::noop::NoopCodeIndexer))
}

#[cfg(not(feature = "noop"))]
fn noop_code() -> Result<Arc<dyn CodeIndexer>, ServiceError> {
    Err(ServiceError::Config(
        "the noop engine requires the `noop` feature".to_string(),
    ))
}

#[cfg(feature = "noop")]
fn noop_issue() -> Result<Arc<dyn IssueIndexer>, ServiceError> {
    Ok(Arc::new(reposearch_core::noop::NoopIssueIndexer))
}

#[cfg(not(feature = "noop"))]
fn noop_issue() -> Result<Arc<dyn IssueIndexer>, ServiceError> {
    Err(ServiceError::Config(
        "the noop engine requires the `noop` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reposearch_core::MemoryObjectStore;
    use tempfile::TempDir;

    fn code_settings(engine: CodeEngine, dir: &TempDir) -> CodeIndexerSettings {
        CodeIndexerSettings {
            engine,
            path: dir.path().to_string_lossy().to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_selects_code_engine() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());

        let tantivy = build_code_indexer(
            &code_settings(CodeEngine::Tantivy, &dir),
            store.clone(),
            Collaborators::default(),
        )
        .unwrap();
        assert_eq!(tantivy.name(), "tantivy");

        let trigram = build_code_indexer(
            &code_settings(CodeEngine::Trigram, &dir),
            store.clone(),
            Collaborators::default(),
        )
        .unwrap();
        assert_eq!(trigram.name(), "trigram");

        let meili = build_code_indexer(
            &CodeIndexerSettings {
                url: "http://localhost:7700".into(),
                ..code_settings(CodeEngine::Meilisearch, &dir)
            },
            store,
            Collaborators::default(),
        )
        .unwrap();
        assert_eq!(meili.name(), "meilisearch");
    }

    #[test]
    fn test_rejects_disabled_and_invalid_settings() {
        let dir = TempDir::new().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new());

        let disabled = CodeIndexerSettings {
            enabled: false,
            ..code_settings(CodeEngine::Tantivy, &dir)
        };
        assert!(matches!(
            build_code_indexer(&disabled, store.clone(), Collaborators::default()),
            Err(ServiceError::Disabled("code"))
        ));

        let bad_glob = CodeIndexerSettings {
            include_patterns: vec!["src/[".into()],
            ..code_settings(CodeEngine::Tantivy, &dir)
        };
        assert!(build_code_indexer(&bad_glob, store, Collaborators::default()).is_err());

        let bad_url = IssueIndexerSettings {
            engine: IssueEngine::Elasticsearch,
            url: "not a url".into(),
            ..Default::default()
        };
        assert!(matches!(
            build_issue_indexer(&bad_url),
            Err(ServiceError::Indexer(IndexerError::Config(_)))
        ));
    }

    #[tokio::test]
    async fn test_selects_issue_engine() {
        let dir = TempDir::new().unwrap();
        let sql = build_issue_indexer(&IssueIndexerSettings {
            engine: IssueEngine::Sql,
            database_url: format!("sqlite://{}/issues.db", dir.path().display()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(sql.name(), "sql");

        let tantivy = build_issue_indexer(&IssueIndexerSettings {
            path: dir.path().join("issues").to_string_lossy().to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(tantivy.name(), "tantivy");
    }
}
