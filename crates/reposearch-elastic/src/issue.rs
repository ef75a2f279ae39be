//! Issue indexer backed by Elasticsearch.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};

use reposearch_core::query::issue_filter;
use reposearch_core::{Capabilities, IndexerError, IssueIndexer, Keyword};
use reposearch_types::{
    IssueDocument, IssueMatch, IssueSearchOptions, IssueSearchResults, Paginator,
    MAX_RESULT_WINDOW,
};

use crate::client::{parse_total, ElasticConfig, EsClient};
use crate::error::ElasticError;
use crate::query::{filter_query, keyword_query};

pub const ISSUE_INDEX_VERSION: u32 = 1;

const TEXT_FIELDS: &[&str] = &["title", "content", "comments"];

fn issue_index_definition() -> Value {
    let long = json!({ "type": "long" });
    let boolean = json!({ "type": "boolean" });
    let text = json!({ "type": "text" });
    json!({
        "mappings": {
            "properties": {
                "id": long,
                "repo_id": long,
                "is_public": boolean,
                "title": text,
                "content": text,
                "comments": text,
                "is_pull": boolean,
                "is_closed": boolean,
                "label_ids": long,
                "no_label": boolean,
                "milestone_id": long,
                "project_id": long,
                "project_column_id": long,
                "poster_id": long,
                "assignee_id": long,
                "mention_ids": long,
                "reviewed_ids": long,
                "review_requested_ids": long,
                "subscriber_ids": long,
                "updated_unix": long,
                "created_unix": long,
                "deadline_unix": long,
                "comment_count": long
            }
        }
    })
}

/// Issue search over an Elasticsearch cluster.
pub struct ElasticIssueIndexer {
    client: EsClient,
    config: ElasticConfig,
}

impl ElasticIssueIndexer {
    pub fn new(config: ElasticConfig) -> Result<Self, ElasticError> {
        Ok(Self {
            client: EsClient::new(&config)?,
            config,
        })
    }

    pub fn client(&self) -> &EsClient {
        &self.client
    }

    fn alias(&self) -> &str {
        &self.config.index_name
    }

    fn search_body(&self, opts: &IssueSearchOptions) -> Value {
        let keyword = Keyword::parse(&opts.keyword, opts.mode());
        let (offset, limit) = Paginator::window(opts.paginator.as_ref());
        let filter = issue_filter(opts);

        let mut query = json!({ "bool": { "must": keyword_query(TEXT_FIELDS, keyword.as_ref()) } });
        if !filter.is_match_all() {
            query["bool"]["filter"] = json!([filter_query(&filter)]);
        }
        let sort = match opts.sort_by.field() {
            None => json!([{ "_score": "desc" }, { "id": "desc" }]),
            Some((field, desc)) => json!([
                { field: { "order": if desc { "desc" } else { "asc" } } },
                { "id": "desc" }
            ]),
        };
        json!({
            "query": query,
            "sort": sort,
            "from": offset,
            "size": limit,
            "track_total_hits": MAX_RESULT_WINDOW,
            "_source": false,
        })
    }
}

#[async_trait]
impl IssueIndexer for ElasticIssueIndexer {
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
            .ensure_index(self.alias(), ISSUE_INDEX_VERSION, &issue_index_definition())
            .await?;
        info!(alias = self.alias(), existed, "Elasticsearch issue index ready");
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
        let mut body = String::new();
        for issue in issues {
            body.push_str(&json!({ "index": { "_index": self.alias(), "_id": issue.id.to_string() } }).to_string());
            body.push('\n');
            body.push_str(
                &serde_json::to_string(issue).map_err(|e| IndexerError::Serialization(e.to_string()))?,
            );
            body.push('\n');
        }
        self.client.bulk(body).await?;
        debug!(count = issues.len(), "Indexed issues");
        Ok(())
    }

    async fn delete(&self, ids: &[i64]) -> Result<(), IndexerError> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut body = String::new();
        for id in ids {
            body.push_str(&json!({ "delete": { "_index": self.alias(), "_id": id.to_string() } }).to_string());
            body.push('\n');
        }
        self.client.bulk(body).await?;
        debug!(count = ids.len(), "Deleted issues");
        Ok(())
    }

    async fn search(&self, opts: &IssueSearchOptions) -> Result<IssueSearchResults, IndexerError> {
        self.capabilities().check(opts.mode(), self.name())?;
        let response = self
            .client
            .json(
                Method::POST,
                &format!("{}/_search", self.alias()),
                Some(&self.search_body(opts)),
            )
            .await?;

        let (total, total_is_estimate) = parse_total(&response["hits"]["total"]);
        let hits = response["hits"]["hits"]
            .as_array()
            .into_iter()
            .flatten()
            .map(|hit| {
                let id = hit["_id"]
                    .as_str()
                    .and_then(|id| id.parse::<i64>().ok())
                    .ok_or_else(|| ElasticError::Response(format!("bad issue id in hit {}", hit)))?;
                let score = hit["_score"].as_f64().unwrap_or(0.0) as f32;
                Ok(IssueMatch { id, score })
            })
            .collect::<Result<Vec<_>, ElasticError>>()?;

        Ok(IssueSearchResults {
            total,
            total_is_estimate,
            hits,
        })
    }
}
