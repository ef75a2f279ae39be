//! Issue indexer backed by Meilisearch.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use reposearch_core::query::issue_filter;
use reposearch_core::{Capabilities, IndexerError, IssueIndexer, Keyword};
use reposearch_types::{
    IssueDocument, IssueMatch, IssueSearchOptions, IssueSearchResults, Paginator, SearchMode,
    MAX_RESULT_WINDOW,
};

use crate::client::{versioned_uid, MeiliClient, MeiliConfig};
use crate::error::MeiliError;
use crate::query::{federated_search, filter_expression, keyword_queries};

pub const ISSUE_INDEX_VERSION: u32 = 1;

const MODES: &[SearchMode] = &[
    SearchMode::Exact,
    SearchMode::Words,
    SearchMode::Fuzzy,
    SearchMode::Native,
];

fn issue_index_settings() -> Value {
    json!({
        "searchableAttributes": ["title", "content", "comments"],
        "displayedAttributes": ["id"],
        "filterableAttributes": [
            "id", "repo_id", "is_public", "is_pull", "is_closed", "label_ids", "no_label",
            "milestone_id", "project_id", "project_column_id", "poster_id", "assignee_id",
            "mention_ids", "reviewed_ids", "review_requested_ids", "subscriber_ids",
            "updated_unix"
        ],
        "sortableAttributes": [
            "id", "updated_unix", "created_unix", "deadline_unix", "comment_count"
        ],
        "pagination": { "maxTotalHits": MAX_RESULT_WINDOW },
    })
}

pub struct MeiliIssueIndexer {
    client: MeiliClient,
    config: MeiliConfig,
}

impl MeiliIssueIndexer {
    pub fn new(config: MeiliConfig) -> Result<Self, MeiliError> {
        Ok(Self {
            client: MeiliClient::new(&config)?,
            config,
        })
    }

    pub fn client(&self) -> &MeiliClient {
        &self.client
    }

    fn uid(&self) -> String {
        versioned_uid(&self.config.index_name, ISSUE_INDEX_VERSION)
    }

    /// Path and body of the search request.
    ///
    /// A keyword that needs several queries goes out as one federated
    /// multi-search.
    fn search_request(&self, opts: &IssueSearchOptions) -> (String, Value) {
        let keyword = Keyword::parse(&opts.keyword, opts.mode());
        let (offset, limit) = Paginator::window(opts.paginator.as_ref());
        let filter = filter_expression(&issue_filter(opts)).map(Value::from);
        // score order is the index's own ranking
        let sort = opts.sort_by.field().map(|(field, desc)| {
            let order = if desc { "desc" } else { "asc" };
            json!([format!("{}:{}", field, order), "id:desc"])
        });

        let mut queries = keyword_queries(keyword.as_ref());
        for query in &mut queries {
            query.insert("showRankingScore".into(), json!(true));
            if let Some(sort) = &sort {
                query.insert("sort".into(), sort.clone());
            }
        }
        if queries.len() > 1 {
            let body = federated_search(&self.uid(), &queries, filter.as_ref(), offset, limit, None);
            return ("multi-search".to_string(), body);
        }

        let mut query = queries.pop().unwrap_or_default();
        query.insert("offset".into(), json!(offset));
        query.insert("limit".into(), json!(limit));
        if let Some(filter) = filter {
            query.insert("filter".into(), filter);
        }
        (format!("indexes/{}/search", self.uid()), Value::Object(query))
    }
}

#[async_trait]
impl IssueIndexer for MeiliIssueIndexer {
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
            .ensure_index(&self.config.index_name, ISSUE_INDEX_VERSION, &issue_index_settings())
            .await?;
        info!(index = %self.uid(), existed, "Meilisearch issue index ready");
        Ok(existed)
    }

    async fn ping(&self) -> Result<(), IndexerError> {
        self.client.ping().await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), IndexerError> {
        Ok(())
    }

    async fn index(&self, issues: &[IssueDocument]) -> Result<(), IndexerError> {
        if issues.is_empty() {
            return Ok(());
        }
        let body =
            serde_json::to_value(issues).map_err(|e| IndexerError::Serialization(e.to_string()))?;
        self.client
            .enqueue(Method::POST, &format!("indexes/{}/documents", self.uid()), Some(&body))
            .await?;
        debug!(count = issues.len(), "Indexed issues");
        Ok(())
    }

    async fn delete(&self, ids: &[i64]) -> Result<(), IndexerError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.client
            .enqueue(
                Method::POST,
                &format!("indexes/{}/documents/delete-batch", self.uid()),
                Some(&json!(ids)),
            )
            .await?;
        debug!(count = ids.len(), "Deleted issues");
        Ok(())
    }

    async fn search(&self, opts: &IssueSearchOptions) -> Result<IssueSearchResults, IndexerError> {
        self.capabilities().check(opts.mode(), self.name())?;
        let (path, body) = self.search_request(opts);
        let response = self.client.json(Method::POST, &path, Some(&body)).await?;

        let total = response["estimatedTotalHits"]
            .as_u64()
            .or_else(|| response["totalHits"].as_u64())
            .unwrap_or(0);
        let hits = response["hits"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|hit| {
                let id = hit["id"]
                    .as_i64()
                    .ok_or_else(|| MeiliError::Response(format!("bad issue id in hit {}", hit)))?;
                let score = hit["_rankingScore"]
                    .as_f64()
                    .or_else(|| hit["_federation"]["weightedRankingScore"].as_f64())
                    .unwrap_or(0.0) as f32;
                Ok(IssueMatch { id, score })
            })
            .collect::<Result<Vec<_>, MeiliError>>()?;

        Ok(IssueSearchResults {
            total,
            total_is_estimate: true,
            hits,
        })
    }
}
