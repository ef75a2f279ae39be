//! Issue indexer backed by an embedded Tantivy index.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::Query;
use tantivy::{DocId, Index, IndexReader, IndexWriter, Score, Searcher, SegmentReader, Term};
use tracing::{debug, info};

use reposearch_core::query::issue_filter;
use reposearch_core::{Capabilities, IndexerError, IssueIndexer, Keyword};
use reposearch_types::{
    IssueDocument, IssueMatch, IssueSearchOptions, IssueSearchResults, IssueSortBy, Paginator,
};

use crate::document::issue_to_doc;
use crate::error::SearchError;
use crate::index::{manual_reader, open_versioned_index, run_blocking, TantivyConfig, ISSUE_INDEX_VERSION};
use crate::query::{all_of, filter_query, keyword_query};
use crate::schema::{build_issue_schema, IssueSchema};

struct IssueState {
    index: Index,
    schema: IssueSchema,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
}

impl IssueState {
    fn open(config: &TantivyConfig) -> Result<(Self, bool), SearchError> {
        let (index, existed) = open_versioned_index(
            &config.index_path,
            ISSUE_INDEX_VERSION,
            build_issue_schema().schema(),
        )?;
        let schema = IssueSchema::from_schema(index.schema())?;
        let writer = config.writer(&index)?;
        let reader = manual_reader(&index)?;
        Ok((
            Self {
                index,
                schema,
                reader,
                writer: Mutex::new(writer),
            },
            existed,
        ))
    }

    fn write<F>(&self, apply: F) -> Result<(), SearchError>
    where
        F: FnOnce(&mut IndexWriter, &IssueSchema) -> Result<(), SearchError>,
    {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| SearchError::IndexLocked(e.to_string()))?;
        apply(&mut writer, &self.schema)?;
        writer.commit()?;
        self.reader.reload()?;
        Ok(())
    }
}

/// Issue search over a local Tantivy index.
pub struct TantivyIssueIndexer {
    config: TantivyConfig,
    state: RwLock<Option<Arc<IssueState>>>,
}

impl TantivyIssueIndexer {
    pub fn new(config: TantivyConfig) -> Self {
        Self {
            config,
            state: RwLock::new(None),
        }
    }

    fn state(&self) -> Result<Arc<IssueState>, IndexerError> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| SearchError::NotInitialized.into())
    }
}

#[async_trait]
impl IssueIndexer for TantivyIssueIndexer {
    fn name(&self) -> &'static str {
        "tantivy"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn init(&self) -> Result<bool, IndexerError> {
        let config = self.config.clone();
        let (state, existed) = run_blocking(move || IssueState::open(&config)).await?;
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(state));
        info!(path = ?self.config.index_path, existed, "Issue index ready");
        Ok(existed)
    }

    async fn ping(&self) -> Result<(), IndexerError> {
        self.state().map(|_| ())
    }

    async fn close(&self) -> Result<(), IndexerError> {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }

    async fn index(&self, issues: &[IssueDocument]) -> Result<(), IndexerError> {
        if issues.is_empty() {
            return Ok(());
        }
        let state = self.state()?;
        let issues = issues.to_vec();
        let count = issues.len();
        run_blocking(move || {
            state.write(|writer, schema| {
                for issue in &issues {
                    writer.delete_term(Term::from_field_i64(schema.id, issue.id));
                    writer.add_document(issue_to_doc(schema, issue))?;
                }
                Ok(())
            })
        })
        .await?;
        debug!(count, "Indexed issues");
        Ok(())
    }

    async fn delete(&self, ids: &[i64]) -> Result<(), IndexerError> {
        if ids.is_empty() {
            return Ok(());
        }
        let state = self.state()?;
        let ids = ids.to_vec();
        run_blocking(move || {
            state.write(|writer, schema| {
                for id in ids {
                    writer.delete_term(Term::from_field_i64(schema.id, id));
                }
                Ok(())
            })
        })
        .await
    }

    async fn search(&self, opts: &IssueSearchOptions) -> Result<IssueSearchResults, IndexerError> {
        let mode = opts.mode();
        self.capabilities().check(mode, self.name())?;

        let keyword = Keyword::parse(&opts.keyword, mode);
        let filter = issue_filter(opts);
        let window = Paginator::window(opts.paginator.as_ref());
        let sort_by = opts.sort_by;
        let state = self.state()?;

        run_blocking(move || {
            let schema = &state.schema;
            let mut parts = vec![keyword_query(&state.index, &schema.text_fields(), keyword.as_ref())?];
            if !filter.is_match_all() {
                parts.push(filter_query(schema, &filter));
            }
            let query = all_of(parts);
            search_sorted(&state.reader.searcher(), query.as_ref(), sort_by, window)
        })
        .await
    }
}

fn search_sorted(
    searcher: &Searcher,
    query: &dyn Query,
    sort_by: IssueSortBy,
    (offset, limit): (usize, usize),
) -> Result<IssueSearchResults, SearchError> {
    if limit == 0 {
        let total = searcher.search(query, &Count)?;
        return Ok(IssueSearchResults {
            total: total as u64,
            total_is_estimate: false,
            hits: Vec::new(),
        });
    }

    // Ties are broken by id descending, read from the `id` fast column.
    let top = TopDocs::with_limit(limit).and_offset(offset);
    let (total, hits) = match sort_by.field() {
        None => {
            let collector = top.tweak_score(|segment: &SegmentReader| {
                let ids = segment.fast_fields().i64("id").ok();
                move |doc: DocId, score: Score| {
                    let id = ids.as_ref().and_then(|c| c.first(doc)).unwrap_or(0);
                    (score, id)
                }
            });
            let (total, docs) = searcher.search(query, &(Count, collector))?;
            let hits: Vec<IssueMatch> = docs
                .into_iter()
                .map(|((score, id), _)| IssueMatch { id, score })
                .collect();
            (total, hits)
        }
        Some((field, desc)) => {
            let field = field.to_string();
            let collector = top.tweak_score(move |segment: &SegmentReader| {
                let values = segment.fast_fields().i64(&field).ok();
                let ids = segment.fast_fields().i64("id").ok();
                move |doc: DocId, _score: Score| {
                    let value = values.as_ref().and_then(|c| c.first(doc)).unwrap_or(0);
                    let id = ids.as_ref().and_then(|c| c.first(doc)).unwrap_or(0);
                    // `!value` reverses the order without overflowing
                    (if desc { value } else { !value }, id)
                }
            });
            let (total, docs) = searcher.search(query, &(Count, collector))?;
            let hits: Vec<IssueMatch> = docs
                .into_iter()
                .map(|((_, id), _)| IssueMatch { id, score: 0.0 })
                .collect();
            (total, hits)
        }
    };

    Ok(IssueSearchResults {
        total: total as u64,
        total_is_estimate: false,
        hits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use reposearch_types::SearchMode;
    use tempfile::TempDir;

    fn issue(id: i64, title: &str) -> IssueDocument {
        IssueDocument {
            id,
            repo_id: id % 2 + 1,
            title: title.to_string(),
            is_public: id % 2 == 0,
            created_unix: 1000 - id,
            comment_count: id % 3,
            ..Default::default()
        }
    }

    async fn open(dir: &TempDir) -> TantivyIssueIndexer {
        let indexer = TantivyIssueIndexer::new(
            TantivyConfig::new(dir.path().join("issues")).with_memory_mb(15),
        );
        indexer.init().await.unwrap();
        indexer
    }

    #[tokio::test]
    async fn test_keyword_ties_sorted_by_id_desc() {
        let dir = TempDir::new().unwrap();
        let indexer = open(&dir).await;
        indexer
            .index(&[
                issue(1000, "hello"),
                issue(1001, "hello"),
                issue(1002, "hello"),
                issue(1003, "goodbye"),
            ])
            .await
            .unwrap();

        let results = indexer.search(&IssueSearchOptions::new("hello")).await.unwrap();
        assert_eq!(results.ids(), vec![1002, 1001, 1000]);
        assert_eq!(results.total, 3);
    }

    #[tokio::test]
    async fn test_filters_and_count_only() {
        let dir = TempDir::new().unwrap();
        let indexer = open(&dir).await;
        let issues: Vec<IssueDocument> = (1..=6).map(|id| issue(id, "title")).collect();
        indexer.index(&issues).await.unwrap();

        let opts = IssueSearchOptions {
            repo_ids: vec![1],
            ..Default::default()
        };
        let results = indexer.search(&opts).await.unwrap();
        assert_eq!(results.ids(), vec![6, 4, 2]);

        let opts = IssueSearchOptions {
            repo_ids: vec![2],
            all_public: true,
            paginator: Some(Paginator::new(1, 0)),
            ..Default::default()
        };
        let results = indexer.search(&opts).await.unwrap();
        assert_eq!(results.total, 6);
        assert!(results.hits.is_empty());
    }

    #[tokio::test]
    async fn test_field_sorts() {
        let dir = TempDir::new().unwrap();
        let indexer = open(&dir).await;
        let issues: Vec<IssueDocument> = (1..=4).map(|id| issue(id, "title")).collect();
        indexer.index(&issues).await.unwrap();

        let mut opts = IssueSearchOptions {
            sort_by: IssueSortBy::CreatedDesc,
            ..Default::default()
        };
        assert_eq!(indexer.search(&opts).await.unwrap().ids(), vec![1, 2, 3, 4]);

        opts.sort_by = IssueSortBy::CreatedAsc;
        assert_eq!(indexer.search(&opts).await.unwrap().ids(), vec![4, 3, 2, 1]);

        // comment counts 1, 2, 0, 1; ties broken by id descending
        opts.sort_by = IssueSortBy::CommentsDesc;
        assert_eq!(indexer.search(&opts).await.unwrap().ids(), vec![2, 4, 1, 3]);
    }

    #[tokio::test]
    async fn test_reindex_and_delete() {
        let dir = TempDir::new().unwrap();
        let indexer = open(&dir).await;
        indexer.index(&[issue(1, "alpha")]).await.unwrap();
        indexer.index(&[issue(1, "beta")]).await.unwrap();

        let alpha = indexer.search(&IssueSearchOptions::new("alpha")).await.unwrap();
        assert_eq!(alpha.total, 0);
        let beta = indexer.search(&IssueSearchOptions::new("beta")).await.unwrap();
        assert_eq!(beta.ids(), vec![1]);

        indexer.delete(&[1]).await.unwrap();
        let beta = indexer.search(&IssueSearchOptions::new("beta")).await.unwrap();
        assert_eq!(beta.total, 0);
    }

    #[tokio::test]
    async fn test_comments_are_searchable() {
        let dir = TempDir::new().unwrap();
        let indexer = open(&dir).await;
        let mut doc = issue(7, "unrelated");
        doc.comments = vec!["first".into(), "needle in a comment".into()];
        indexer.index(&[doc]).await.unwrap();

        let opts = IssueSearchOptions {
            keyword: "needel".into(),
            search_mode: SearchMode::Fuzzy,
            ..Default::default()
        };
        assert_eq!(indexer.search(&opts).await.unwrap().ids(), vec![7]);
    }
}
