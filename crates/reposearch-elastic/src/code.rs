//! Code indexer backed by Elasticsearch.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use reposearch_core::normalize::{language_facets, search_result};
use reposearch_core::{
    BatchWriter, Capabilities, CodeIndexer, ExtractStats, Extractor, FlushingBatch, IndexerError,
    Keyword,
};
use reposearch_types::{
    code_document_id, CodeDocument, CodeSearchOptions, CodeSearchResults, Paginator, RepoChanges,
    MAX_RESULT_WINDOW,
};

use crate::client::{parse_total, ElasticConfig, EsClient};
use crate::error::ElasticError;
use crate::query::keyword_query;

/// Bump when the mapping below changes.
pub const CODE_INDEX_VERSION: u32 = 1;

const CONTENT_FIELDS: &[&str] = &["content"];

fn code_index_definition() -> Value {
    json!({
        "settings": {
            "analysis": {
                "tokenizer": {
                    "code_tokenizer": { "type": "pattern", "pattern": "[^\\p{L}\\p{N}]+" }
                },
                "analyzer": {
                    "code": { "type": "custom", "tokenizer": "code_tokenizer", "filter": ["lowercase"] }
                }
            }
        },
        "mappings": {
            "properties": {
                "repo_id": { "type": "long" },
                "commit_id": { "type": "keyword", "index": false },
                "filename": { "type": "keyword" },
                "content": { "type": "text", "analyzer": "code" },
                "language": { "type": "keyword" },
                "updated_at": { "type": "long", "index": false }
            }
        }
    })
}

/// Code search over an Elasticsearch cluster.
pub struct ElasticCodeIndexer {
    client: EsClient,
    config: ElasticConfig,
    extractor: Extractor,
}

impl ElasticCodeIndexer {
    pub fn new(config: ElasticConfig, extractor: Extractor) -> Result<Self, ElasticError> {
        Ok(Self {
            client: EsClient::new(&config)?,
            config,
            extractor,
        })
    }

    pub fn client(&self) -> &EsClient {
        &self.client
    }

    fn alias(&self) -> &str {
        &self.config.index_name
    }

    fn search_body(&self, opts: &CodeSearchOptions, keyword: Option<&Keyword>) -> Value {
        let (offset, limit) = Paginator::window(opts.paginator.as_ref());
        let mut filters = Vec::new();
        if !opts.repo_ids.is_empty() {
            filters.push(json!({ "terms": { "repo_id": opts.repo_ids } }));
        }
        let mut body = json!({
            "query": {
                "bool": {
                    "must": keyword_query(CONTENT_FIELDS, keyword),
                    "filter": filters,
                }
            },
            "aggs": {
                "language": { "terms": { "field": "language", "size": 1000 } }
            },
            "from": offset,
            "size": limit,
            "track_total_hits": MAX_RESULT_WINDOW,
        });
        // post_filter narrows the hits but not the aggregation
        if let Some(language) = opts.language_filter() {
            body["post_filter"] = json!({ "term": { "language": language } });
        }
        body
    }
}

#[async_trait]
impl BatchWriter for ElasticCodeIndexer {
    type Batch = String;

    fn new_batch(&self) -> Self::Batch {
        String::new()
    }

    fn add_document(&self, batch: &mut Self::Batch, doc: CodeDocument) -> Result<(), IndexerError> {
        let action = json!({ "index": { "_index": self.alias(), "_id": doc.id() } });
        batch.push_str(&action.to_string());
        batch.push('\n');
        let source = serde_json::to_string(&doc)
            .map_err(|e| IndexerError::Serialization(e.to_string()))?;
        batch.push_str(&source);
        batch.push('\n');
        Ok(())
    }

    fn add_delete(
        &self,
        batch: &mut Self::Batch,
        repo_id: i64,
        filename: &str,
    ) -> Result<(), IndexerError> {
        let action = json!({
            "delete": { "_index": self.alias(), "_id": code_document_id(repo_id, filename) }
        });
        batch.push_str(&action.to_string());
        batch.push('\n');
        Ok(())
    }

    async fn submit(&self, batch: Self::Batch) -> Result<(), IndexerError> {
        if batch.is_empty() {
            return Ok(());
        }
        Ok(self.client.bulk(batch).await?)
    }
}

#[async_trait]
impl CodeIndexer for ElasticCodeIndexer {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn init(&self) -> Result<bool, IndexerError> {
        self.client.wait_healthy(self.config.startup_timeout).await?;
        let existed = self
            .client
            .ensure_index(self.alias(), CODE_INDEX_VERSION, &code_index_definition())
            .await?;
        info!(alias = self.alias(), flavor = ?self.client.flavor(), existed, "Elasticsearch code index ready");
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
            .json(
                Method::POST,
                &format!("{}/_delete_by_query?refresh=true&conflicts=proceed", self.alias()),
                Some(&json!({ "query": { "term": { "repo_id": repo_id } } })),
            )
            .await?;
        info!(repo_id, "Deleted repository from Elasticsearch");
        Ok(())
    }

    async fn search(&self, opts: &CodeSearchOptions) -> Result<CodeSearchResults, IndexerError> {
        let mode = opts.mode();
        self.capabilities().check(mode, self.name())?;
        let keyword = Keyword::parse(&opts.keyword, mode);
        let body = self.search_body(opts, keyword.as_ref());

        let response = self
            .client
            .json(Method::POST, &format!("{}/_search", self.alias()), Some(&body))
            .await?;

        let (total, total_is_estimate) = parse_total(&response["hits"]["total"]);
        let languages = self.extractor.collaborators().languages.as_ref();
        let hits = response["hits"]["hits"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|hit| {
                serde_json::from_value::<CodeDocument>(hit["_source"].clone())
                    .map(|doc| search_result(doc, keyword.as_ref(), languages))
                    .map_err(|e| IndexerError::Serialization(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let counts = response["aggregations"]["language"]["buckets"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|bucket| {
                Some((bucket["key"].as_str()?.to_string(), bucket["doc_count"].as_u64()?))
            });
        let languages = language_facets(counts, languages);

        debug!(total, hits = hits.len(), "Elasticsearch code search complete");
        Ok(CodeSearchResults {
            total,
            total_is_estimate,
            hits,
            languages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use reposearch_core::{Collaborators, ExtractSettings, MemoryObjectStore};
    use reposearch_types::{ElasticFlavor, FileUpdate, SearchMode};
    use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn indexer(server: &MockServer, store: &MemoryObjectStore, flavor: ElasticFlavor) -> ElasticCodeIndexer {
        let extractor = Extractor::new(
            Arc::new(store.clone()),
            Collaborators::default(),
            ExtractSettings::default(),
        );
        let config = ElasticConfig::new(server.uri(), "codes")
            .with_flavor(flavor)
            .with_startup_timeout(Duration::from_secs(1));
        ElasticCodeIndexer::new(config, extractor).unwrap()
    }

    #[tokio::test]
    async fn test_index_sends_bulk_and_delete_ops() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(body_string_contains(r#""_id":"1_a.js""#))
            .and(body_string_contains(r#""delete":{"_id":"1_old.js","_index":"codes"}"#))
            .and(body_string_contains("function Foo() {}"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"errors": false, "items": []})))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryObjectStore::new();
        store.insert("b1", "function Foo() {}");
        let changes = RepoChanges::new()
            .with_update(FileUpdate::new("a.js", "b1"))
            .with_removed("old.js");
        let stats = indexer(&server, &store, ElasticFlavor::V8)
            .index(&CancellationToken::new(), 1, "c1", &changes)
            .await
            .unwrap();
        assert_eq!(stats.indexed, 1);
        assert_eq!(stats.deleted, 1);
    }

    #[tokio::test]
    async fn test_search_parses_hits_total_and_facets() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/codes/_search"))
            .and(header("content-type", "application/vnd.elasticsearch+json;compatible-with=8"))
            .and(body_partial_json(json!({
                "post_filter": { "term": { "language": "JavaScript" } },
                "query": { "bool": { "filter": [{ "terms": { "repo_id": [1] } }] } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": {
                    "total": { "value": 10000, "relation": "gte" },
                    "hits": [{
                        "_id": "1_a.js",
                        "_score": 1.0,
                        "_source": {
                            "repo_id": 1, "commit_id": "c1", "filename": "a.js",
                            "content": "function Foo() {}", "language": "JavaScript", "updated_at": 5
                        }
                    }]
                },
                "aggregations": { "language": { "buckets": [
                    { "key": "Go", "doc_count": 3 },
                    { "key": "JavaScript", "doc_count": 5 }
                ] } }
            })))
            .mount(&server)
            .await;

        let store = MemoryObjectStore::new();
        let results = indexer(&server, &store, ElasticFlavor::V8)
            .search(
                &CodeSearchOptions::new("Foo")
                    .with_repo_ids(vec![1])
                    .with_language("JavaScript"),
            )
            .await
            .unwrap();

        assert_eq!(results.total, 10000);
        assert!(results.total_is_estimate);
        assert_eq!(results.hits[0].filename, "a.js");
        assert_eq!((results.hits[0].start_index, results.hits[0].end_index), (9, 12));
        let facets: Vec<(&str, u64)> = results
            .languages
            .iter()
            .map(|l| (l.language.as_str(), l.count))
            .collect();
        assert_eq!(facets, vec![("JavaScript", 5), ("Go", 3)]);
    }

    #[tokio::test]
    async fn test_v7_search_with_integer_total() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/codes/_search"))
            .and(header("content-type", "application/json"))
            .and(body_partial_json(json!({ "from": 20, "size": 10 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": { "total": 2, "hits": [] }
            })))
            .mount(&server)
            .await;

        let store = MemoryObjectStore::new();
        let results = indexer(&server, &store, ElasticFlavor::V7)
            .search(&CodeSearchOptions::new("x").with_page(3, 10))
            .await
            .unwrap();
        assert_eq!(results.total, 2);
        assert!(!results.total_is_estimate);
        assert!(results.languages.is_empty());
    }

    #[tokio::test]
    async fn test_bad_query_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/codes/_search"))
            .respond_with(ResponseTemplate::new(400).set_body_string("query_shard_exception"))
            .mount(&server)
            .await;

        let store = MemoryObjectStore::new();
        let err = indexer(&server, &store, ElasticFlavor::V8)
            .search(&CodeSearchOptions::new("[").with_mode(SearchMode::Regexp))
            .await
            .unwrap_err();
        assert!(matches!(err, IndexerError::InvalidQuery(_)));
    }

    #[tokio::test]
    async fn test_delete_by_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/codes/_delete_by_query"))
            .and(body_partial_json(json!({ "query": { "term": { "repo_id": 9 } } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "deleted": 4 })))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryObjectStore::new();
        indexer(&server, &store, ElasticFlavor::V8).delete(9).await.unwrap();
    }

    #[tokio::test]
    async fn test_init_against_unreachable_cluster() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/_cluster/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let store = MemoryObjectStore::new();
        let indexer = indexer(&server, &store, ElasticFlavor::V8);
        let err = indexer.init().await.unwrap_err();
        assert!(matches!(err, IndexerError::Unavailable(_)));
        assert!(!indexer.client().is_available());
    }
}
