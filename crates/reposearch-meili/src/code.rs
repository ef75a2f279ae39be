//! Code indexer backed by Meilisearch.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use reposearch_core::normalize::{language_facets, search_result};
use reposearch_core::{
    BatchWriter, Capabilities, CodeIndexer, ExtractStats, Extractor, FlushingBatch, IndexerError,
    Keyword,
};
use reposearch_types::{
    CodeDocument, CodeSearchOptions, CodeSearchResults, Paginator, RepoChanges, SearchMode,
    MAX_RESULT_WINDOW,
};

use crate::client::{versioned_uid, MeiliClient, MeiliConfig};
use crate::error::MeiliError;
use crate::query::{federated_search, keyword_queries, quote};

pub const CODE_INDEX_VERSION: u32 = 1;

const MODES: &[SearchMode] = &[
    SearchMode::Exact,
    SearchMode::Words,
    SearchMode::Fuzzy,
    SearchMode::Native,
];

/// Document id: repo id plus a hash of the path.
///
/// Ids may only hold alphanumerics, `-` and `_`, so the path itself
/// cannot be part of it.
pub fn meili_document_id(repo_id: i64, filename: &str) -> String {
    format!("{}_{}", repo_id, blake3::hash(filename.as_bytes()).to_hex())
}

fn code_index_settings() -> Value {
    json!({
        "searchableAttributes": ["content"],
        "filterableAttributes": ["repo_id", "language"],
        "displayedAttributes": ["repo_id", "commit_id", "filename", "content", "language", "updated_at"],
        "pagination": { "maxTotalHits": MAX_RESULT_WINDOW },
        "faceting": { "maxValuesPerFacet": 1000 },
    })
}

fn take(value: &mut Value, pointer: &str) -> Value {
    value.pointer_mut(pointer).map(Value::take).unwrap_or_default()
}

/// Pending writes of one batch.
#[derive(Debug, Default)]
pub struct MeiliBatch {
    documents: Vec<Value>,
    deletes: Vec<String>,
}

pub struct MeiliCodeIndexer {
    client: MeiliClient,
    config: MeiliConfig,
    extractor: Extractor,
}

impl MeiliCodeIndexer {
    pub fn new(config: MeiliConfig, extractor: Extractor) -> Result<Self, MeiliError> {
        Ok(Self {
            client: MeiliClient::new(&config)?,
            config,
            extractor,
        })
    }

    pub fn client(&self) -> &MeiliClient {
        &self.client
    }

    fn uid(&self) -> String {
        versioned_uid(&self.config.index_name, CODE_INDEX_VERSION)
    }

    fn repo_filter(opts: &CodeSearchOptions) -> Option<String> {
        if opts.repo_ids.is_empty() {
            return None;
        }
        let ids: Vec<String> = opts.repo_ids.iter().map(i64::to_string).collect();
        Some(format!("repo_id IN [{}]", ids.join(", ")))
    }

    fn search_query(&self, opts: &CodeSearchOptions, mut query: Map<String, Value>) -> Value {
        let (offset, limit) = Paginator::window(opts.paginator.as_ref());
        query.insert("offset".into(), json!(offset));
        query.insert("limit".into(), json!(limit));

        let mut filters: Vec<String> = Self::repo_filter(opts).into_iter().collect();
        if let Some(language) = opts.language_filter() {
            filters.push(format!("language = {}", quote(language)));
        } else {
            query.insert("facets".into(), json!(["language"]));
        }
        if !filters.is_empty() {
            query.insert("filter".into(), json!(filters));
        }
        Value::Object(query)
    }

    /// Unfiltered companion query feeding the facets.
    fn facet_query(&self, opts: &CodeSearchOptions, mut query: Map<String, Value>) -> Value {
        query.insert("limit".into(), json!(0));
        query.insert("facets".into(), json!(["language"]));
        if let Some(filter) = Self::repo_filter(opts) {
            query.insert("filter".into(), json!([filter]));
        }
        Value::Object(query)
    }

    /// Run one query per word as a federated search.
    ///
    /// Returns the merged result and the language distribution. Under a
    /// language filter the distribution needs a second, unfiltered search.
    async fn search_merged(
        &self,
        opts: &CodeSearchOptions,
        queries: &[Map<String, Value>],
    ) -> Result<(Value, Value), MeiliError> {
        let uid = self.uid();
        let (offset, limit) = Paginator::window(opts.paginator.as_ref());
        let scope: Vec<String> = Self::repo_filter(opts).into_iter().collect();

        let Some(language) = opts.language_filter() else {
            let filter = (!scope.is_empty()).then(|| json!(scope));
            let body =
                federated_search(&uid, queries, filter.as_ref(), offset, limit, Some("language"));
            let mut response = self.client.json(Method::POST, "multi-search", Some(&body)).await?;
            let facets = take(&mut response, "/facetDistribution/language");
            return Ok((response, facets));
        };

        let mut filtered = scope.clone();
        filtered.push(format!("language = {}", quote(language)));
        let body = federated_search(&uid, queries, Some(&json!(filtered)), offset, limit, None);
        let response = self.client.json(Method::POST, "multi-search", Some(&body)).await?;

        let filter = (!scope.is_empty()).then(|| json!(scope));
        let body = federated_search(&uid, queries, filter.as_ref(), 0, 0, Some("language"));
        let mut facet_response = self.client.json(Method::POST, "multi-search", Some(&body)).await?;
        Ok((response, take(&mut facet_response, "/facetDistribution/language")))
    }
}

#[async_trait]
impl BatchWriter for MeiliCodeIndexer {
    type Batch = MeiliBatch;

    fn new_batch(&self) -> Self::Batch {
        MeiliBatch::default()
    }

    fn add_document(&self, batch: &mut Self::Batch, doc: CodeDocument) -> Result<(), IndexerError> {
        let id = meili_document_id(doc.repo_id, &doc.filename);
        let mut value =
            serde_json::to_value(doc).map_err(|e| IndexerError::Serialization(e.to_string()))?;
        value["id"] = json!(id);
        batch.documents.push(value);
        Ok(())
    }

    fn add_delete(
        &self,
        batch: &mut Self::Batch,
        repo_id: i64,
        filename: &str,
    ) -> Result<(), IndexerError> {
        batch.deletes.push(meili_document_id(repo_id, filename));
        Ok(())
    }

    async fn submit(&self, batch: Self::Batch) -> Result<(), IndexerError> {
        let uid = self.uid();
        if !batch.documents.is_empty() {
            self.client
                .enqueue(
                    Method::POST,
                    &format!("indexes/{}/documents", uid),
                    Some(&Value::Array(batch.documents)),
                )
                .await?;
        }
        if !batch.deletes.is_empty() {
            self.client
                .enqueue(
                    Method::POST,
                    &format!("indexes/{}/documents/delete-batch", uid),
                    Some(&json!(batch.deletes)),
                )
                .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CodeIndexer for MeiliCodeIndexer {
    fn name(&self) -> &'static str {
        "meilisearch"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new(MODES)
    }

    async fn init(&self) -> Result<bool, IndexerError> {
        self.client.wait_healthy(self.config.startup_timeout).await?;
        let existed = self
            .client
            .ensure_index(&self.config.index_name, CODE_INDEX_VERSION, &code_index_settings())
            .await?;
        info!(index = %self.uid(), existed, "Meilisearch code index ready");
        Ok(existed)
    }

    async fn ping(&self) -> Result<(), IndexerError> {
        self.client.ping().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), IndexerError> {
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
        self.client
            .enqueue(
                Method::POST,
                &format!("indexes/{}/documents/delete", self.uid()),
                Some(&json!({ "filter": format!("repo_id = {}", repo_id) })),
            )
            .await?;
        info!(repo_id, "Deleted repository from Meilisearch");
        Ok(())
    }

    async fn search(&self, opts: &CodeSearchOptions) -> Result<CodeSearchResults, IndexerError> {
        let mode = opts.mode();
        self.capabilities().check(mode, self.name())?;
        let keyword = Keyword::parse(&opts.keyword, mode);
        let mut queries = keyword_queries(keyword.as_ref());

        let (result, facets) = if queries.len() > 1 {
            self.search_merged(opts, &queries).await?
        } else if opts.language_filter().is_some() {
            // a language filter would hide the other buckets, so the facets
            // come from an unfiltered query sent alongside
            let params = queries.pop().unwrap_or_default();
            let mut queries = [
                self.search_query(opts, params.clone()),
                self.facet_query(opts, params),
            ];
            for query in &mut queries {
                query["indexUid"] = json!(self.uid());
            }
            let body = json!({ "queries": queries });
            let mut response = self.client.json(Method::POST, "multi-search", Some(&body)).await?;
            let facets = take(&mut response, "/results/1/facetDistribution/language");
            (take(&mut response, "/results/0"), facets)
        } else {
            let query = self.search_query(opts, queries.pop().unwrap_or_default());
            let mut response = self
                .client
                .json(Method::POST, &format!("indexes/{}/search", self.uid()), Some(&query))
                .await?;
            let facets = take(&mut response, "/facetDistribution/language");
            (response, facets)
        };

        let total = result["estimatedTotalHits"]
            .as_u64()
            .or_else(|| result["totalHits"].as_u64())
            .unwrap_or(0);
        let languages = self.extractor.collaborators().languages.as_ref();
        let hits = result["hits"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|hit| {
                serde_json::from_value::<CodeDocument>(hit.clone())
                    .map(|doc| search_result(doc, keyword.as_ref(), languages))
                    .map_err(|e| IndexerError::Serialization(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let counts = facets
            .as_object()
            .into_iter()
            .flatten()
            .filter_map(|(language, count)| Some((language.clone(), count.as_u64()?)));
        let languages = language_facets(counts, languages);

        debug!(total, hits = hits.len(), "Meilisearch code search complete");
        Ok(CodeSearchResults {
            total,
            total_is_estimate: true,
            hits,
            languages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use reposearch_core::{Collaborators, ExtractSettings, MemoryObjectStore};
    use reposearch_types::FileUpdate;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn indexer(server: &MockServer, store: &MemoryObjectStore) -> MeiliCodeIndexer {
        let extractor = Extractor::new(
            Arc::new(store.clone()),
            Collaborators::default(),
            ExtractSettings::default(),
        );
        MeiliCodeIndexer::new(MeiliConfig::new(server.uri(), "codes"), extractor).unwrap()
    }

    async fn mount_succeeded_tasks(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/tasks/\d+$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "succeeded" })))
            .mount(server)
            .await;
    }

    fn hit(filename: &str, content: &str, language: &str) -> Value {
        json!({
            "repo_id": 1, "commit_id": "c1", "filename": filename,
            "content": content, "language": language, "updated_at": 5
        })
    }

    #[test]
    fn test_document_id_is_safe() {
        let id = meili_document_id(3, "src/my file.rs");
        assert!(id.starts_with("3_"));
        assert!(id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_'));
        assert_ne!(id, meili_document_id(3, "src/my_file.rs"));
    }

    #[tokio::test]
    async fn test_index_adds_then_deletes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/codes_v1/documents"))
            .and(body_string_contains("function Foo() {}"))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "taskUid": 10 })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/indexes/codes_v1/documents/delete-batch"))
            .and(body_string_contains(&meili_document_id(1, "old.js")))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "taskUid": 11 })))
            .expect(1)
            .mount(&server)
            .await;
        mount_succeeded_tasks(&server).await;

        let store = MemoryObjectStore::new();
        store.insert("b1", "function Foo() {}");
        let changes = RepoChanges::new()
            .with_update(FileUpdate::new("a.js", "b1"))
            .with_removed("old.js");
        let stats = indexer(&server, &store)
            .index(&CancellationToken::new(), 1, "c1", &changes)
            .await
            .unwrap();
        assert_eq!((stats.indexed, stats.deleted), (1, 1));
    }

    #[tokio::test]
    async fn test_search_single_request_with_facets() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/codes_v1/search"))
            .and(body_partial_json(json!({
                "q": "\"Foo\"",
                "matchingStrategy": "all",
                "filter": ["repo_id IN [1]"],
                "facets": ["language"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [hit("a.js", "function Foo() {}", "JavaScript")],
                "estimatedTotalHits": 1,
                "facetDistribution": { "language": { "JavaScript": 1 } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryObjectStore::new();
        let results = indexer(&server, &store)
            .search(&CodeSearchOptions::new("Foo").with_repo_ids(vec![1]))
            .await
            .unwrap();
        assert_eq!(results.total, 1);
        assert!(results.total_is_estimate);
        assert_eq!((results.hits[0].start_index, results.hits[0].end_index), (9, 12));
        assert_eq!(results.languages[0].language, "JavaScript");
    }

    #[tokio::test]
    async fn test_language_filter_uses_multi_search() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/multi-search"))
            .and(body_string_contains(r#"language = \"Go\""#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": [
                {
                    "hits": [hit("main.go", "func main() {}", "Go")],
                    "estimatedTotalHits": 3
                },
                {
                    "hits": [],
                    "estimatedTotalHits": 8,
                    "facetDistribution": { "language": { "Go": 3, "JavaScript": 5 } }
                }
            ] })))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryObjectStore::new();
        let results = indexer(&server, &store)
            .search(&CodeSearchOptions::new("main").with_language("Go"))
            .await
            .unwrap();
        assert_eq!(results.total, 3);
        assert_eq!(results.hits[0].language, "Go");
        let facets: Vec<(&str, u64)> = results
            .languages
            .iter()
            .map(|l| (l.language.as_str(), l.count))
            .collect();
        assert_eq!(facets, vec![("JavaScript", 5), ("Go", 3)]);
    }

    #[tokio::test]
    async fn test_words_search_sends_one_query_per_word() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/multi-search"))
            .and(body_partial_json(json!({
                "federation": {
                    "offset": 0,
                    "limit": MAX_RESULT_WINDOW,
                    "facetsByIndex": { "codes_v1": ["language"] }
                },
                "queries": [
                    { "indexUid": "codes_v1", "q": "\"qux\"", "matchingStrategy": "all" },
                    { "indexUid": "codes_v1", "q": "\"foo\"", "matchingStrategy": "all" }
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [hit("a.txt", "foo bar baz", "Text")],
                "estimatedTotalHits": 1,
                "facetDistribution": { "language": { "Text": 1 } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryObjectStore::new();
        let results = indexer(&server, &store)
            .search(&CodeSearchOptions::new("qux foo").with_mode(SearchMode::Words))
            .await
            .unwrap();
        assert_eq!(results.total, 1);
        assert_eq!(results.hits[0].filename, "a.txt");
        assert_eq!((results.hits[0].start_index, results.hits[0].end_index), (0, 3));
        assert_eq!(results.languages[0].count, 1);
    }

    #[tokio::test]
    async fn test_words_search_with_language_filter() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/multi-search"))
            .and(body_string_contains(r#"language = \"Go\""#))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [hit("main.go", "func main() {}", "Go")],
                "estimatedTotalHits": 1
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/multi-search"))
            .and(body_partial_json(json!({ "federation": { "limit": 0 } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": [],
                "estimatedTotalHits": 4,
                "facetDistribution": { "language": { "Go": 1, "Rust": 3 } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryObjectStore::new();
        let results = indexer(&server, &store)
            .search(
                &CodeSearchOptions::new("main fn")
                    .with_mode(SearchMode::Words)
                    .with_language("Go"),
            )
            .await
            .unwrap();
        assert_eq!(results.total, 1);
        let facets: Vec<(&str, u64)> = results
            .languages
            .iter()
            .map(|l| (l.language.as_str(), l.count))
            .collect();
        assert_eq!(facets, vec![("Rust", 3), ("Go", 1)]);
    }

    #[tokio::test]
    async fn test_regexp_is_unsupported() {
        let server = MockServer::start().await;
        let store = MemoryObjectStore::new();
        let err = indexer(&server, &store)
            .search(&CodeSearchOptions::new("fo+").with_mode(SearchMode::Regexp))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::UnsupportedMode { mode: SearchMode::Regexp, .. }));
    }

    #[tokio::test]
    async fn test_delete_repo_by_filter() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/codes_v1/documents/delete"))
            .and(body_partial_json(json!({ "filter": "repo_id = 4" })))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "taskUid": 12 })))
            .expect(1)
            .mount(&server)
            .await;
        mount_succeeded_tasks(&server).await;

        let store = MemoryObjectStore::new();
        indexer(&server, &store).delete(4).await.unwrap();
    }
}
