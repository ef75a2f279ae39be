//! Search parameters and filter expressions.

use serde_json::{json, Map, Value};

use reposearch_core::{Filter, Keyword};
use reposearch_types::SearchMode;

/// Always false; every document carries an `id`.
const MATCH_NOTHING: &str = "NOT id EXISTS";

/// `q` and `matchingStrategy` of every query a keyword needs.
///
/// A single query always requires its first term, so words and fuzzy
/// keywords get one query per word and the hits of all of them are merged.
/// Phrases are not typo tolerant, so exact and words searches quote their
/// terms; fuzzy searches send bare words and rely on typo tolerance.
pub fn keyword_queries(keyword: Option<&Keyword>) -> Vec<Map<String, Value>> {
    let Some(keyword) = keyword else {
        return vec![params(String::new(), None)];
    };
    match keyword.mode {
        SearchMode::Exact => vec![params(phrase(&keyword.text), Some("all"))],
        SearchMode::Words => keyword
            .words()
            .into_iter()
            .map(|word| params(phrase(word), Some("all")))
            .collect(),
        SearchMode::Fuzzy => keyword
            .words()
            .into_iter()
            .map(|word| params(word.to_string(), Some("all")))
            .collect(),
        // regexp never gets here, the capability check rejects it
        SearchMode::Regexp | SearchMode::Native => vec![params(keyword.text.clone(), None)],
    }
}

fn params(q: String, strategy: Option<&str>) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("q".into(), json!(q));
    if let Some(strategy) = strategy {
        params.insert("matchingStrategy".into(), json!(strategy));
    }
    params
}

/// A federated multi-search running every query against `uid`.
///
/// The hits come back as one list paged by `offset` and `limit`, with a
/// document matched by several queries listed once. `facet` asks for the
/// distribution of that attribute over the merged hits.
pub fn federated_search(
    uid: &str,
    queries: &[Map<String, Value>],
    filter: Option<&Value>,
    offset: usize,
    limit: usize,
    facet: Option<&str>,
) -> Value {
    let queries: Vec<Value> = queries
        .iter()
        .map(|params| {
            let mut query = params.clone();
            query.insert("indexUid".into(), json!(uid));
            if let Some(filter) = filter {
                query.insert("filter".into(), filter.clone());
            }
            Value::Object(query)
        })
        .collect();

    let mut federation = json!({ "offset": offset, "limit": limit });
    if let Some(facet) = facet {
        let mut by_index = Map::new();
        by_index.insert(uid.to_string(), json!([facet]));
        federation["facetsByIndex"] = Value::Object(by_index);
        federation["mergeFacets"] = json!({});
    }
    json!({ "federation": federation, "queries": queries })
}

fn phrase(text: &str) -> String {
    format!("\"{}\"", text.replace('"', " "))
}

/// Quote a string value for a filter expression.
pub fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Lower a filter tree into a filter expression. `None` matches everything.
pub fn filter_expression(filter: &Filter) -> Option<String> {
    match filter {
        Filter::Eq(field, value) => Some(format!("{} = {}", field.name(), value)),
        Filter::Bool(field, value) => Some(format!("{} = {}", field.name(), value)),
        Filter::In(_, values) if values.is_empty() => Some(MATCH_NOTHING.to_string()),
        Filter::In(field, values) => Some(format!(
            "{} IN [{}]",
            field.name(),
            values
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )),
        Filter::Range { field, gte, lte } => match (gte, lte) {
            (Some(gte), Some(lte)) => Some(format!("{} {} TO {}", field.name(), gte, lte)),
            (Some(gte), None) => Some(format!("{} >= {}", field.name(), gte)),
            (None, Some(lte)) => Some(format!("{} <= {}", field.name(), lte)),
            (None, None) => None,
        },
        Filter::And(children) => {
            let parts: Vec<String> = children.iter().filter_map(filter_expression).collect();
            join(parts, " AND ")
        }
        Filter::Or(children) => {
            let mut parts = Vec::with_capacity(children.len());
            for child in children {
                // one unconstrained branch makes the whole disjunction true
                parts.push(filter_expression(child)?);
            }
            if parts.is_empty() {
                return Some(MATCH_NOTHING.to_string());
            }
            join(parts, " OR ")
        }
        Filter::Not(inner) => match filter_expression(inner) {
            Some(inner) => Some(format!("NOT ({})", inner)),
            None => Some(MATCH_NOTHING.to_string()),
        },
    }
}

fn join(parts: Vec<String>, separator: &str) -> Option<String> {
    match parts.len() {
        0 => None,
        1 => parts.into_iter().next(),
        _ => Some(
            parts
                .iter()
                .map(|p| format!("({})", p))
                .collect::<Vec<_>>()
                .join(separator),
        ),
    }
}
