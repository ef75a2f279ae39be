//! Conversion between domain documents and Tantivy documents.

use tantivy::schema::Value;
use tantivy::TantivyDocument;

use reposearch_types::{CodeDocument, IssueDocument};

use crate::schema::{CodeSchema, IssueSchema};

/// Convert a code document to a Tantivy document.
pub fn code_to_doc(schema: &CodeSchema, doc: &CodeDocument) -> TantivyDocument {
    let mut out = TantivyDocument::new();
    out.add_text(schema.id, doc.id());
    out.add_i64(schema.repo_id, doc.repo_id);
    out.add_text(schema.commit_id, &doc.commit_id);
    out.add_text(schema.filename, &doc.filename);
    out.add_text(schema.content, &doc.content);
    out.add_text(schema.language, &doc.language);
    out.add_i64(schema.updated_at, doc.updated_at);
    out
}

/// Read a stored code document back.
pub fn doc_to_code(schema: &CodeSchema, doc: &TantivyDocument) -> CodeDocument {
    let text = |field| {
        doc.get_first(field)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string()
    };
    CodeDocument {
        repo_id: doc
            .get_first(schema.repo_id)
            .and_then(|v| v.as_i64())
            .unwrap_or(0),
        commit_id: text(schema.commit_id),
        filename: text(schema.filename),
        content: text(schema.content),
        language: text(schema.language),
        updated_at: doc
            .get_first(schema.updated_at)
            .and_then(|v| v.as_i64())
            .unwrap_or(0),
    }
}

/// Convert an issue to a Tantivy document.
pub fn issue_to_doc(schema: &IssueSchema, issue: &IssueDocument) -> TantivyDocument {
    let mut out = TantivyDocument::new();
    out.add_i64(schema.id, issue.id);
    out.add_i64(schema.repo_id, issue.repo_id);
    out.add_bool(schema.is_public, issue.is_public);
    out.add_text(schema.title, &issue.title);
    out.add_text(schema.content, &issue.content);
    for comment in &issue.comments {
        out.add_text(schema.comments, comment);
    }
    out.add_bool(schema.is_pull, issue.is_pull);
    out.add_bool(schema.is_closed, issue.is_closed);
    for id in &issue.label_ids {
        out.add_i64(schema.label_ids, *id);
    }
    out.add_bool(schema.no_label, issue.no_label);
    out.add_i64(schema.milestone_id, issue.milestone_id);
    out.add_i64(schema.project_id, issue.project_id);
    out.add_i64(schema.project_column_id, issue.project_column_id);
    out.add_i64(schema.poster_id, issue.poster_id);
    out.add_i64(schema.assignee_id, issue.assignee_id);
    for (field, ids) in [
        (schema.mention_ids, &issue.mention_ids),
        (schema.reviewed_ids, &issue.reviewed_ids),
        (schema.review_requested_ids, &issue.review_requested_ids),
        (schema.subscriber_ids, &issue.subscriber_ids),
    ] {
        for id in ids {
            out.add_i64(field, *id);
        }
    }
    out.add_i64(schema.updated_unix, issue.updated_unix);
    out.add_i64(schema.created_unix, issue.created_unix);
    out.add_i64(schema.deadline_unix, issue.deadline_unix);
    out.add_i64(schema.comment_count, issue.comment_count);
    out
}
