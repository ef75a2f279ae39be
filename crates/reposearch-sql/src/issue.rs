//! Issue indexer over SQLite tables.
//!
//! Scalar fields live in `issue_index`, one row per issue. List fields
//! (labels, mentions, reviewers, subscribers) are exploded into
//! `issue_index_member(issue_id, field, value)` rows so membership filters
//! become `EXISTS` lookups.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, info};

use reposearch_core::query::issue_filter;
use reposearch_core::{Capabilities, IndexerError, IssueField, IssueIndexer, Keyword};
use reposearch_types::{
    IssueDocument, IssueIndexerSettings, IssueMatch, IssueSearchOptions, IssueSearchResults,
    Paginator, SearchMode,
};

use crate::error::SqlError;
use crate::query::{push_filter, push_keyword};

const MODES: &[SearchMode] = &[SearchMode::Exact, SearchMode::Words, SearchMode::Fuzzy];

const CREATE_ISSUE_TABLE: &str = "CREATE TABLE IF NOT EXISTS issue_index (
    id INTEGER PRIMARY KEY,
    repo_id INTEGER NOT NULL,
    is_public INTEGER NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    comments TEXT NOT NULL,
    is_pull INTEGER NOT NULL,
    is_closed INTEGER NOT NULL,
    no_label INTEGER NOT NULL,
    milestone_id INTEGER NOT NULL,
    project_id INTEGER NOT NULL,
    project_column_id INTEGER NOT NULL,
    poster_id INTEGER NOT NULL,
    assignee_id INTEGER NOT NULL,
    updated_unix INTEGER NOT NULL,
    created_unix INTEGER NOT NULL,
    deadline_unix INTEGER NOT NULL,
    comment_count INTEGER NOT NULL
)";

const CREATE_MEMBER_TABLE: &str = "CREATE TABLE IF NOT EXISTS issue_index_member (
    issue_id INTEGER NOT NULL,
    field TEXT NOT NULL,
    value INTEGER NOT NULL,
    PRIMARY KEY (issue_id, field, value)
)";

const CREATE_MEMBER_LOOKUP: &str =
    "CREATE INDEX IF NOT EXISTS issue_index_member_lookup ON issue_index_member (field, value)";

const MEMBER_FIELDS: [IssueField; 5] = [
    IssueField::LabelIds,
    IssueField::MentionIds,
    IssueField::ReviewedIds,
    IssueField::ReviewRequestedIds,
    IssueField::SubscriberIds,
];

/// SQL backend configuration
#[derive(Debug, Clone)]
pub struct SqlConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl SqlConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 4,
            acquire_timeout: Duration::from_secs(30),
        }
    }

    pub fn from_settings(settings: &IssueIndexerSettings) -> Self {
        Self {
            acquire_timeout: Duration::from_secs(settings.request_timeout_secs),
            ..Self::new(settings.database_url.clone())
        }
    }
}

/// Issue search over SQL tables.
pub struct SqlIssueIndexer {
    pool: SqlitePool,
}

impl SqlIssueIndexer {
    /// Wrap an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Build a lazily connecting pool; nothing is opened until `init`.
    pub fn connect(config: &SqlConfig) -> Result<Self, SqlError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| SqlError::InvalidUrl(format!("{}: {}", config.database_url, e)))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_lazy_with(options);
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn upsert(&self, issues: &[IssueDocument]) -> Result<(), SqlError> {
        let mut tx = self.pool.begin().await?;
        for issue in issues {
            sqlx::query(
                "INSERT INTO issue_index (id, repo_id, is_public, title, content, comments, \
                 is_pull, is_closed, no_label, milestone_id, project_id, project_column_id, \
                 poster_id, assignee_id, updated_unix, created_unix, deadline_unix, comment_count) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(id) DO UPDATE SET repo_id = excluded.repo_id, \
                 is_public = excluded.is_public, title = excluded.title, \
                 content = excluded.content, comments = excluded.comments, \
                 is_pull = excluded.is_pull, is_closed = excluded.is_closed, \
                 no_label = excluded.no_label, milestone_id = excluded.milestone_id, \
                 project_id = excluded.project_id, project_column_id = excluded.project_column_id, \
                 poster_id = excluded.poster_id, assignee_id = excluded.assignee_id, \
                 updated_unix = excluded.updated_unix, created_unix = excluded.created_unix, \
                 deadline_unix = excluded.deadline_unix, comment_count = excluded.comment_count",
            )
            .bind(issue.id)
            .bind(issue.repo_id)
            .bind(issue.is_public)
            .bind(&issue.title)
            .bind(&issue.content)
            .bind(issue.comments.join("\n"))
            .bind(issue.is_pull)
            .bind(issue.is_closed)
            .bind(issue.no_label)
            .bind(issue.milestone_id)
            .bind(issue.project_id)
            .bind(issue.project_column_id)
            .bind(issue.poster_id)
            .bind(issue.assignee_id)
            .bind(issue.updated_unix)
            .bind(issue.created_unix)
            .bind(issue.deadline_unix)
            .bind(issue.comment_count)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM issue_index_member WHERE issue_id = ?")
                .bind(issue.id)
                .execute(&mut *tx)
                .await?;

            let members: Vec<(&'static str, i64)> = MEMBER_FIELDS
                .iter()
                .flat_map(|field| {
                    field
                        .values(issue)
                        .iter()
                        .map(|value| (field.name(), *value))
                        .collect::<Vec<_>>()
                })
                .collect();
            if !members.is_empty() {
                let mut qb: QueryBuilder<'_, Sqlite> =
                    QueryBuilder::new("INSERT OR IGNORE INTO issue_index_member (issue_id, field, value) ");
                qb.push_values(members, |mut row, (field, value)| {
                    row.push_bind(issue.id).push_bind(field).push_bind(value);
                });
                qb.build().execute(&mut *tx).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn remove(&self, ids: &[i64]) -> Result<(), SqlError> {
        let mut tx = self.pool.begin().await?;
        for (table, column) in [("issue_index_member", "issue_id"), ("issue_index", "id")] {
            let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new("DELETE FROM ");
            qb.push(table).push(" WHERE ").push(column).push(" IN (");
            let mut list = qb.separated(", ");
            for id in ids {
                list.push_bind(*id);
            }
            list.push_unseparated(")");
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Append the WHERE clause shared by the count and the page query.
    fn push_where(qb: &mut QueryBuilder<'_, Sqlite>, keyword: Option<&Keyword>, opts: &IssueSearchOptions) {
        qb.push(" WHERE ");
        match keyword {
            Some(keyword) => push_keyword(qb, keyword),
            None => {
                qb.push("1 = 1");
            }
        }
        let filter = issue_filter(opts);
        if !filter.is_match_all() {
            qb.push(" AND ");
            push_filter(qb, &filter);
        }
    }

    async fn run_search(&self, opts: &IssueSearchOptions) -> Result<IssueSearchResults, SqlError> {
        let keyword = Keyword::parse(&opts.keyword, opts.mode());
        let (offset, limit) = Paginator::window(opts.paginator.as_ref());

        let mut count: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM issue_index");
        Self::push_where(&mut count, keyword.as_ref(), opts);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut hits = Vec::new();
        if limit > 0 {
            let mut page: QueryBuilder<'_, Sqlite> = QueryBuilder::new("SELECT id FROM issue_index");
            Self::push_where(&mut page, keyword.as_ref(), opts);
            page.push(" ORDER BY ");
            if let Some((field, desc)) = opts.sort_by.field() {
                page.push(field).push(if desc { " DESC, " } else { " ASC, " });
            }
            page.push("id DESC LIMIT ")
                .push_bind(limit as i64)
                .push(" OFFSET ")
                .push_bind(offset as i64);
            let ids: Vec<i64> = page.build_query_scalar().fetch_all(&self.pool).await?;
            hits = ids.into_iter().map(|id| IssueMatch { id, score: 0.0 }).collect();
        }

        Ok(IssueSearchResults {
            total: total.max(0) as u64,
            total_is_estimate: false,
            hits,
        })
    }
}

#[async_trait]
impl IssueIndexer for SqlIssueIndexer {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::new(MODES)
    }

    async fn init(&self) -> Result<bool, IndexerError> {
        let existing: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'issue_index'",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(SqlError::from)?;

        for statement in [CREATE_ISSUE_TABLE, CREATE_MEMBER_TABLE, CREATE_MEMBER_LOOKUP] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(SqlError::from)?;
        }
        info!(existed = existing > 0, "SQL issue index ready");
        Ok(existing > 0)
    }

    async fn ping(&self) -> Result<(), IndexerError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(SqlError::from)?;
        Ok(())
    }

    async fn close(&self) -> Result<(), IndexerError> {
        self.pool.close().await;
        Ok(())
    }

    async fn index(&self, issues: &[IssueDocument]) -> Result<(), IndexerError> {
        if issues.is_empty() {
            return Ok(());
        }
        self.upsert(issues).await?;
        debug!(count = issues.len(), "Indexed issues");
        Ok(())
    }

    async fn delete(&self, ids: &[i64]) -> Result<(), IndexerError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.remove(ids).await?;
        debug!(count = ids.len(), "Deleted issues");
        Ok(())
    }

    async fn search(&self, opts: &IssueSearchOptions) -> Result<IssueSearchResults, IndexerError> {
        self.capabilities().check(opts.mode(), self.name())?;
        Ok(self.run_search(opts).await?)
    }
}
