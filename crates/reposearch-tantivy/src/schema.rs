//! Tantivy schema definitions.
//!
//! Code documents are keyed by `"{repo_id}_{filename}"`, issues by their
//! integer id. Content is split by the `code` tokenizer, which breaks on
//! every non-alphanumeric character and lowercases.

use tantivy::schema::{
    Field, IndexRecordOption, Schema, TextFieldIndexing, TextOptions, FAST, INDEXED, STORED,
    STRING, TEXT,
};
use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, TextAnalyzer};
use tantivy::Index;

use reposearch_core::IssueField;

use crate::SearchError;

/// Name of the tokenizer registered for code content.
pub const CODE_TOKENIZER: &str = "code";

/// Register the tokenizers used by both schemas on an index.
pub fn register_tokenizers(index: &Index) {
    let analyzer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(64))
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(CODE_TOKENIZER, analyzer);
}

fn code_text() -> TextOptions {
    TextOptions::default()
        .set_indexing_options(
            TextFieldIndexing::default()
                .set_tokenizer(CODE_TOKENIZER)
                .set_index_option(IndexRecordOption::WithFreqsAndPositions),
        )
        .set_stored()
}

fn get_field(schema: &Schema, name: &str) -> Result<Field, SearchError> {
    schema
        .get_field(name)
        .map_err(|_| SearchError::SchemaMismatch(format!("missing {} field", name)))
}

/// Schema field handles for the code index
#[derive(Debug, Clone)]
pub struct CodeSchema {
    schema: Schema,
    /// Document key `{repo_id}_{filename}` (STRING | STORED)
    pub id: Field,
    /// Owning repository (INDEXED | STORED | FAST)
    pub repo_id: Field,
    /// Commit the content was read at (STRING | STORED)
    pub commit_id: Field,
    /// Path inside the repository (code tokenizer, STORED)
    pub filename: Field,
    /// File content (code tokenizer with positions, STORED)
    pub content: Field,
    /// Detected language (STRING | STORED | FAST for facets)
    pub language: Field,
    /// Unix seconds of indexing (STORED)
    pub updated_at: Field,
}

impl CodeSchema {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Create a CodeSchema from an existing Tantivy Schema
    pub fn from_schema(schema: Schema) -> Result<Self, SearchError> {
        Ok(Self {
            id: get_field(&schema, "id")?,
            repo_id: get_field(&schema, "repo_id")?,
            commit_id: get_field(&schema, "commit_id")?,
            filename: get_field(&schema, "filename")?,
            content: get_field(&schema, "content")?,
            language: get_field(&schema, "language")?,
            updated_at: get_field(&schema, "updated_at")?,
            schema,
        })
    }
}

/// Build the code search schema.
pub fn build_code_schema() -> CodeSchema {
    let mut builder = Schema::builder();

    let id = builder.add_text_field("id", STRING | STORED);
    let repo_id = builder.add_i64_field("repo_id", INDEXED | STORED | FAST);
    let commit_id = builder.add_text_field("commit_id", STRING | STORED);
    let filename = builder.add_text_field("filename", code_text());
    let content = builder.add_text_field("content", code_text());
    let language = builder.add_text_field("language", STRING | STORED | FAST);
    let updated_at = builder.add_i64_field("updated_at", STORED);

    CodeSchema {
        schema: builder.build(),
        id,
        repo_id,
        commit_id,
        filename,
        content,
        language,
        updated_at,
    }
}

/// Schema field handles for the issue index
#[derive(Debug, Clone)]
pub struct IssueSchema {
    schema: Schema,
    pub id: Field,
    pub repo_id: Field,
    pub is_public: Field,
    pub title: Field,
    pub content: Field,
    /// One value per comment
    pub comments: Field,
    pub is_pull: Field,
    pub is_closed: Field,
    pub label_ids: Field,
    pub no_label: Field,
    pub milestone_id: Field,
    pub project_id: Field,
    pub project_column_id: Field,
    pub poster_id: Field,
    pub assignee_id: Field,
    pub mention_ids: Field,
    pub reviewed_ids: Field,
    pub review_requested_ids: Field,
    pub subscriber_ids: Field,
    pub updated_unix: Field,
    pub created_unix: Field,
    pub deadline_unix: Field,
    pub comment_count: Field,
}

impl IssueSchema {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Searchable text fields.
    pub fn text_fields(&self) -> Vec<Field> {
        vec![self.title, self.content, self.comments]
    }

    /// Field handle of a filterable issue field.
    pub fn field(&self, field: IssueField) -> Field {
        match field {
            IssueField::RepoId => self.repo_id,
            IssueField::IsPublic => self.is_public,
            IssueField::IsPull => self.is_pull,
            IssueField::IsClosed => self.is_closed,
            IssueField::LabelIds => self.label_ids,
            IssueField::NoLabel => self.no_label,
            IssueField::MilestoneId => self.milestone_id,
            IssueField::ProjectId => self.project_id,
            IssueField::ProjectColumnId => self.project_column_id,
            IssueField::PosterId => self.poster_id,
            IssueField::AssigneeId => self.assignee_id,
            IssueField::MentionIds => self.mention_ids,
            IssueField::ReviewedIds => self.reviewed_ids,
            IssueField::ReviewRequestedIds => self.review_requested_ids,
            IssueField::SubscriberIds => self.subscriber_ids,
            IssueField::UpdatedUnix => self.updated_unix,
        }
    }

    pub fn from_schema(schema: Schema) -> Result<Self, SearchError> {
        Ok(Self {
            id: get_field(&schema, "id")?,
            repo_id: get_field(&schema, "repo_id")?,
            is_public: get_field(&schema, "is_public")?,
            title: get_field(&schema, "title")?,
            content: get_field(&schema, "content")?,
            comments: get_field(&schema, "comments")?,
            is_pull: get_field(&schema, "is_pull")?,
            is_closed: get_field(&schema, "is_closed")?,
            label_ids: get_field(&schema, "label_ids")?,
            no_label: get_field(&schema, "no_label")?,
            milestone_id: get_field(&schema, "milestone_id")?,
            project_id: get_field(&schema, "project_id")?,
            project_column_id: get_field(&schema, "project_column_id")?,
            poster_id: get_field(&schema, "poster_id")?,
            assignee_id: get_field(&schema, "assignee_id")?,
            mention_ids: get_field(&schema, "mention_ids")?,
            reviewed_ids: get_field(&schema, "reviewed_ids")?,
            review_requested_ids: get_field(&schema, "review_requested_ids")?,
            subscriber_ids: get_field(&schema, "subscriber_ids")?,
            updated_unix: get_field(&schema, "updated_unix")?,
            created_unix: get_field(&schema, "created_unix")?,
            deadline_unix: get_field(&schema, "deadline_unix")?,
            comment_count: get_field(&schema, "comment_count")?,
            schema,
        })
    }
}

/// Build the issue search schema.
///
/// Every filter and sort field is INDEXED | FAST so it can be matched,
/// ranged and sorted on.
pub fn build_issue_schema() -> IssueSchema {
    let mut builder = Schema::builder();

    let id = builder.add_i64_field("id", INDEXED | STORED | FAST);
    let repo_id = builder.add_i64_field("repo_id", INDEXED | FAST);
    let is_public = builder.add_bool_field("is_public", INDEXED | FAST);
    let title = builder.add_text_field("title", TEXT);
    let content = builder.add_text_field("content", TEXT);
    let comments = builder.add_text_field("comments", TEXT);
    let is_pull = builder.add_bool_field("is_pull", INDEXED | FAST);
    let is_closed = builder.add_bool_field("is_closed", INDEXED | FAST);
    let label_ids = builder.add_i64_field("label_ids", INDEXED);
    let no_label = builder.add_bool_field("no_label", INDEXED | FAST);
    let milestone_id = builder.add_i64_field("milestone_id", INDEXED | FAST);
    let project_id = builder.add_i64_field("project_id", INDEXED | FAST);
    let project_column_id = builder.add_i64_field("project_column_id", INDEXED | FAST);
    let poster_id = builder.add_i64_field("poster_id", INDEXED | FAST);
    let assignee_id = builder.add_i64_field("assignee_id", INDEXED | FAST);
    let mention_ids = builder.add_i64_field("mention_ids", INDEXED);
    let reviewed_ids = builder.add_i64_field("reviewed_ids", INDEXED);
    let review_requested_ids = builder.add_i64_field("review_requested_ids", INDEXED);
    let subscriber_ids = builder.add_i64_field("subscriber_ids", INDEXED);
    let updated_unix = builder.add_i64_field("updated_unix", INDEXED | FAST);
    let created_unix = builder.add_i64_field("created_unix", INDEXED | FAST);
    let deadline_unix = builder.add_i64_field("deadline_unix", INDEXED | FAST);
    let comment_count = builder.add_i64_field("comment_count", INDEXED | FAST);

    IssueSchema {
        schema: builder.build(),
        id,
        repo_id,
        is_public,
        title,
        content,
        comments,
        is_pull,
        is_closed,
        label_ids,
        no_label,
        milestone_id,
        project_id,
        project_column_id,
        poster_id,
        assignee_id,
        mention_ids,
        reviewed_ids,
        review_requested_ids,
        subscriber_ids,
        updated_unix,
        created_unix,
        deadline_unix,
        comment_count,
    }
}
