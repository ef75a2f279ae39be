//! Code indexer backed by an embedded Tantivy index.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::json;
use tantivy::aggregation::agg_req::Aggregations;
use tantivy::aggregation::agg_result::AggregationResults;
use tantivy::aggregation::AggregationCollector;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{Query, TermQuery, TermSetQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{Index, IndexReader, IndexWriter, Searcher, TantivyDocument, Term};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use reposearch_core::normalize::{language_facets, search_result};
use reposearch_core::{
    BatchWriter, Capabilities, CodeIndexer, ExtractStats, Extractor, FlushingBatch, IndexerError,
    Keyword, LanguageClassifier,
};
use reposearch_types::{
    code_document_id, CodeDocument, CodeSearchOptions, CodeSearchResults, Paginator, RepoChanges,
};

use crate::document::{code_to_doc, doc_to_code};
use crate::error::SearchError;
use crate::index::{manual_reader, open_versioned_index, run_blocking, TantivyConfig, CODE_INDEX_VERSION};
use crate::query::{all_of, keyword_query};
use crate::schema::{build_code_schema, CodeSchema};

/// Largest number of distinct languages read back from the facet aggregation.
const LANGUAGE_BUCKETS: u32 = 1000;

struct CodeState {
    index: Index,
    schema: CodeSchema,
    reader: IndexReader,
    writer: Mutex<IndexWriter>,
}

impl CodeState {
    fn open(config: &TantivyConfig) -> Result<(Self, bool), SearchError> {
        let (index, existed) =
            open_versioned_index(&config.index_path, CODE_INDEX_VERSION, build_code_schema().schema())?;
        let schema = CodeSchema::from_schema(index.schema())?;
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

    /// Run `apply` under the writer lock, then commit and reload.
    fn write<F>(&self, apply: F) -> Result<(), SearchError>
    where
        F: FnOnce(&mut IndexWriter, &CodeSchema) -> Result<(), SearchError>,
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

/// One buffered write.
#[derive(Debug)]
pub enum CodeOp {
    Upsert(CodeDocument),
    /// Delete by document key
    Delete(String),
}

/// Code search over a local Tantivy index.
pub struct TantivyCodeIndexer {
    config: TantivyConfig,
    extractor: Extractor,
    state: RwLock<Option<Arc<CodeState>>>,
}

impl TantivyCodeIndexer {
    pub fn new(config: TantivyConfig, extractor: Extractor) -> Self {
        Self {
            config,
            extractor,
            state: RwLock::new(None),
        }
    }

    fn state(&self) -> Result<Arc<CodeState>, IndexerError> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| SearchError::NotInitialized.into())
    }
}

#[async_trait]
impl BatchWriter for TantivyCodeIndexer {
    type Batch = Vec<CodeOp>;

    fn new_batch(&self) -> Self::Batch {
        Vec::new()
    }

    fn add_document(&self, batch: &mut Self::Batch, doc: CodeDocument) -> Result<(), IndexerError> {
        batch.push(CodeOp::Upsert(doc));
        Ok(())
    }

    fn add_delete(
        &self,
        batch: &mut Self::Batch,
        repo_id: i64,
        filename: &str,
    ) -> Result<(), IndexerError> {
        batch.push(CodeOp::Delete(code_document_id(repo_id, filename)));
        Ok(())
    }

    async fn submit(&self, batch: Self::Batch) -> Result<(), IndexerError> {
        let state = self.state()?;
        run_blocking(move || {
            state.write(|writer, schema| {
                for op in batch {
                    match op {
                        CodeOp::Upsert(doc) => {
                            writer.delete_term(Term::from_field_text(schema.id, &doc.id()));
                            writer.add_document(code_to_doc(schema, &doc))?;
                        }
                        CodeOp::Delete(id) => {
                            writer.delete_term(Term::from_field_text(schema.id, &id));
                        }
                    }
                }
                Ok(())
            })
        })
        .await
    }
}

#[async_trait]
impl CodeIndexer for TantivyCodeIndexer {
    fn name(&self) -> &'static str {
        "tantivy"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn init(&self) -> Result<bool, IndexerError> {
        let config = self.config.clone();
        let (state, existed) = run_blocking(move || CodeState::open(&config)).await?;
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(state));
        info!(path = ?self.config.index_path, existed, "Code index ready");
        Ok(existed)
    }

    async fn ping(&self) -> Result<(), IndexerError> {
        self.state().map(|_| ())
    }

    async fn close(&self) -> Result<(), IndexerError> {
        if self
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            info!(path = ?self.config.index_path, "Code index closed");
        }
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
        let state = self.state()?;
        run_blocking(move || {
            state.write(|writer, schema| {
                writer.delete_term(Term::from_field_i64(schema.repo_id, repo_id));
                Ok(())
            })
        })
        .await?;
        info!(repo_id, "Deleted repository from code index");
        Ok(())
    }

    async fn search(&self, opts: &CodeSearchOptions) -> Result<CodeSearchResults, IndexerError> {
        let mode = opts.mode();
        self.capabilities().check(mode, self.name())?;

        let request = SearchRequest {
            keyword: Keyword::parse(&opts.keyword, mode),
            repo_ids: opts.repo_ids.clone(),
            language: opts.language_filter().map(str::to_string),
            window: Paginator::window(opts.paginator.as_ref()),
        };
        let state = self.state()?;
        let languages = Arc::clone(&self.extractor.collaborators().languages);
        run_blocking(move || request.run(&state, languages.as_ref())).await
    }
}

struct SearchRequest {
    keyword: Option<Keyword>,
    repo_ids: Vec<i64>,
    language: Option<String>,
    window: (usize, usize),
}

impl SearchRequest {
    fn run(
        &self,
        state: &CodeState,
        languages: &dyn LanguageClassifier,
    ) -> Result<CodeSearchResults, SearchError> {
        let schema = &state.schema;
        let searcher = state.reader.searcher();

        let mut scope = vec![keyword_query(
            &state.index,
            &[schema.filename, schema.content],
            self.keyword.as_ref(),
        )?];
        if !self.repo_ids.is_empty() {
            scope.push(Box::new(TermSetQuery::new(
                self.repo_ids
                    .iter()
                    .map(|id| Term::from_field_i64(schema.repo_id, *id)),
            )));
        }
        let scoped = all_of(scope);

        let filtered: Box<dyn Query> = match &self.language {
            Some(language) => all_of(vec![
                scoped.box_clone(),
                Box::new(TermQuery::new(
                    Term::from_field_text(schema.language, language),
                    IndexRecordOption::Basic,
                )),
            ]),
            None => scoped.box_clone(),
        };

        let (offset, limit) = self.window;
        let (total, top_docs) = if limit == 0 {
            (searcher.search(&filtered, &Count)?, Vec::new())
        } else {
            searcher.search(
                &filtered,
                &(Count, TopDocs::with_limit(limit).and_offset(offset)),
            )?
        };

        let mut hits = Vec::with_capacity(top_docs.len());
        for (_score, address) in top_docs {
            let doc: TantivyDocument = searcher.doc(address)?;
            hits.push(search_result(
                doc_to_code(schema, &doc),
                self.keyword.as_ref(),
                languages,
            ));
        }

        let facets = language_facets(language_counts(&searcher, scoped.as_ref())?, languages);

        debug!(
            total,
            hits = hits.len(),
            languages = facets.len(),
            "Code search complete"
        );

        Ok(CodeSearchResults {
            total: total as u64,
            total_is_estimate: false,
            hits,
            languages: facets,
        })
    }
}

/// Per-language document counts of `query`, ignoring any language filter.
fn language_counts(
    searcher: &Searcher,
    query: &dyn Query,
) -> Result<Vec<(String, u64)>, SearchError> {
    let aggs: Aggregations = serde_json::from_value(json!({
        "languages": { "terms": { "field": "language", "size": LANGUAGE_BUCKETS } }
    }))?;
    let collector = AggregationCollector::from_aggs(aggs, Default::default());
    let result: AggregationResults = searcher.search(query, &collector)?;
    let value = serde_json::to_value(result)?;

    let counts = value["languages"]["buckets"]
        .as_array()
        .map(|buckets| {
            buckets
                .iter()
                .filter_map(|bucket| {
                    let key = bucket["key"].as_str()?;
                    let count = bucket["doc_count"].as_u64()?;
                    Some((key.to_string(), count))
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(counts)
}
