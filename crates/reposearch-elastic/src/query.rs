//! Query DSL construction.

use serde_json::{json, Map, Value};

use reposearch_core::{Filter, Keyword};
use reposearch_types::SearchMode;

/// Keyword query over `fields`; `match_all` for a blank keyword.
pub fn keyword_query(fields: &[&str], keyword: Option<&Keyword>) -> Value {
    let Some(keyword) = keyword else {
        return json!({ "match_all": {} });
    };
    match keyword.mode {
        SearchMode::Exact => json!({
            "multi_match": { "query": keyword.text, "fields": fields, "type": "phrase" }
        }),
        SearchMode::Words => json!({
            "multi_match": { "query": keyword.text, "fields": fields, "operator": "or" }
        }),
        SearchMode::Fuzzy => json!({
            "multi_match": {
                "query": keyword.text,
                "fields": fields,
                "fuzziness": keyword.fuzziness,
            }
        }),
        // term-level: the pattern has to match one indexed token
        SearchMode::Regexp => {
            let should: Vec<Value> = fields
                .iter()
                .map(|field| {
                    json!({ "regexp": { *field: {
                        "value": keyword.text,
                        "flags": "ALL",
                        "case_insensitive": true,
                    } } })
                })
                .collect();
            json!({ "bool": { "should": should, "minimum_should_match": 1 } })
        }
        SearchMode::Native => json!({
            "query_string": { "query": keyword.text, "fields": fields }
        }),
    }
}

/// Lower a filter tree into filter-context clauses.
pub fn filter_query(filter: &Filter) -> Value {
    match filter {
        Filter::Eq(field, value) => json!({ "term": { field.name(): value } }),
        Filter::Bool(field, value) => json!({ "term": { field.name(): value } }),
        Filter::In(field, values) => json!({ "terms": { field.name(): values } }),
        Filter::Range { field, gte, lte } => {
            let mut bounds = Map::new();
            if let Some(gte) = gte {
                bounds.insert("gte".into(), json!(gte));
            }
            if let Some(lte) = lte {
                bounds.insert("lte".into(), json!(lte));
            }
            json!({ "range": { field.name(): bounds } })
        }
        Filter::And(children) if children.is_empty() => json!({ "match_all": {} }),
        Filter::And(children) => json!({
            "bool": { "filter": children.iter().map(filter_query).collect::<Vec<_>>() }
        }),
        Filter::Or(children) => json!({
            "bool": {
                "should": children.iter().map(filter_query).collect::<Vec<_>>(),
                "minimum_should_match": 1,
            }
        }),
        Filter::Not(inner) => json!({ "bool": { "must_not": [filter_query(inner)] } }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reposearch_core::IssueField;

    #[test]
    fn test_keyword_modes() {
        let exact = Keyword::parse("foo bar", SearchMode::Exact);
        assert_eq!(
            keyword_query(&["content"], exact.as_ref()),
            json!({ "multi_match": { "query": "foo bar", "fields": ["content"], "type": "phrase" } })
        );

        let fuzzy = Keyword::parse("wrold", SearchMode::Fuzzy);
        assert_eq!(
            keyword_query(&["title"], fuzzy.as_ref())["multi_match"]["fuzziness"],
            json!(1)
        );

        let regexp = Keyword::parse("ans.*", SearchMode::Regexp);
        assert_eq!(
            keyword_query(&["title", "content"], regexp.as_ref())["bool"]["should"][1],
            json!({ "regexp": { "content": { "value": "ans.*", "flags": "ALL", "case_insensitive": true } } })
        );

        assert_eq!(keyword_query(&["content"], None), json!({ "match_all": {} }));
    }

    #[test]
    fn test_filter_lowering() {
        let filter = Filter::And(vec![
            Filter::Or(vec![
                Filter::In(IssueField::RepoId, vec![1, 2]),
                Filter::Bool(IssueField::IsPublic, true),
            ]),
            Filter::Not(Box::new(Filter::Eq(IssueField::LabelIds, 4))),
            Filter::Range {
                field: IssueField::UpdatedUnix,
                gte: None,
                lte: Some(99),
            },
        ]);
        assert_eq!(
            filter_query(&filter),
            json!({ "bool": { "filter": [
                { "bool": { "should": [
                    { "terms": { "repo_id": [1, 2] } },
                    { "term": { "is_public": true } }
                ], "minimum_should_match": 1 } },
                { "bool": { "must_not": [{ "term": { "label_ids": 4 } }] } },
                { "range": { "updated_unix": { "lte": 99 } } }
            ] } })
        );
    }
}
