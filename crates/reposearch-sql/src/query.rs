//! Lowering of keywords and issue filters into SQL.

use sqlx::{QueryBuilder, Sqlite};

use reposearch_core::{Filter, IssueField, Keyword};
use reposearch_types::SearchMode;

/// Columns a keyword is matched against.
const TEXT_COLUMNS: [&str; 3] = ["title", "content", "comments"];

/// `%text%` with LIKE wildcards escaped by a backslash.
pub fn like_pattern(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('%');
    for ch in text.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('%');
    out
}

fn push_like_any_column(qb: &mut QueryBuilder<'_, Sqlite>, text: &str) {
    qb.push("(");
    for (i, column) in TEXT_COLUMNS.iter().enumerate() {
        if i > 0 {
            qb.push(" OR ");
        }
        qb.push(*column)
            .push(" LIKE ")
            .push_bind(like_pattern(text))
            .push(" ESCAPE '\\'");
    }
    qb.push(")");
}

/// Append the keyword condition. Exact matches the whole keyword as one
/// substring; words and fuzzy match any of its words.
pub fn push_keyword(qb: &mut QueryBuilder<'_, Sqlite>, keyword: &Keyword) {
    match keyword.mode {
        SearchMode::Words | SearchMode::Fuzzy => {
            let words = keyword.words();
            qb.push("(");
            for (i, word) in words.iter().enumerate() {
                if i > 0 {
                    qb.push(" OR ");
                }
                push_like_any_column(qb, word);
            }
            qb.push(")");
        }
        _ => push_like_any_column(qb, &keyword.text),
    }
}

fn push_values(qb: &mut QueryBuilder<'_, Sqlite>, values: &[i64]) {
    let mut list = qb.separated(", ");
    for value in values {
        list.push_bind(*value);
    }
}

fn push_member_exists(qb: &mut QueryBuilder<'_, Sqlite>, field: IssueField, values: &[i64]) {
    qb.push("EXISTS (SELECT 1 FROM issue_index_member m WHERE m.issue_id = issue_index.id AND m.field = ")
        .push_bind(field.name())
        .push(" AND m.value IN (");
    push_values(qb, values);
    qb.push("))");
}

fn push_joined(qb: &mut QueryBuilder<'_, Sqlite>, children: &[Filter], op: &str) {
    qb.push("(");
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            qb.push(op);
        }
        push_filter(qb, child);
    }
    qb.push(")");
}

/// Append a filter tree as a boolean SQL expression.
pub fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) {
    match filter {
        Filter::Eq(field, value) => {
            if field.is_multi_valued() {
                push_member_exists(qb, *field, std::slice::from_ref(value));
            } else {
                qb.push(field.name()).push(" = ").push_bind(*value);
            }
        }
        Filter::Bool(field, value) => {
            qb.push(field.name()).push(" = ").push_bind(*value);
        }
        Filter::In(_, values) if values.is_empty() => {
            qb.push("0 = 1");
        }
        Filter::In(field, values) => {
            if field.is_multi_valued() {
                push_member_exists(qb, *field, values);
            } else {
                qb.push(field.name()).push(" IN (");
                push_values(qb, values);
                qb.push(")");
            }
        }
        Filter::Range { field, gte, lte } => {
            qb.push("(1 = 1");
            if let Some(gte) = gte {
                qb.push(" AND ").push(field.name()).push(" >= ").push_bind(*gte);
            }
            if let Some(lte) = lte {
                qb.push(" AND ").push(field.name()).push(" <= ").push_bind(*lte);
            }
            qb.push(")");
        }
        Filter::And(children) if children.is_empty() => {
            qb.push("1 = 1");
        }
        Filter::And(children) => push_joined(qb, children, " AND "),
        Filter::Or(children) if children.is_empty() => {
            qb.push("0 = 1");
        }
        Filter::Or(children) => push_joined(qb, children, " OR "),
        Filter::Not(inner) => {
            qb.push("NOT (");
            push_filter(qb, inner);
            qb.push(")");
        }
    }
}
