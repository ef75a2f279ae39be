//! Lowering of keywords and issue filters into Tantivy queries.

use std::ops::Bound;

use tantivy::query::{
    AllQuery, BooleanQuery, EmptyQuery, FuzzyTermQuery, Occur, PhraseQuery, Query, QueryParser,
    RangeQuery, RegexQuery, TermQuery, TermSetQuery,
};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::{Index, Term};

use reposearch_core::{Filter, Keyword};
use reposearch_types::SearchMode;

use crate::error::SearchError;
use crate::schema::IssueSchema;

/// Tokens of `text` as the field's tokenizer would index them.
fn analyze(index: &Index, field: Field, text: &str) -> Result<Vec<String>, SearchError> {
    let mut analyzer = index.tokenizer_for_field(field)?;
    let mut stream = analyzer.token_stream(text);
    let mut tokens = Vec::new();
    while stream.advance() {
        tokens.push(stream.token().text.clone());
    }
    Ok(tokens)
}

fn term_query(field: Field, token: &str) -> Box<dyn Query> {
    Box::new(TermQuery::new(
        Term::from_field_text(field, token),
        IndexRecordOption::WithFreqs,
    ))
}

fn any_of(queries: Vec<Box<dyn Query>>) -> Box<dyn Query> {
    match queries.len() {
        0 => Box::new(EmptyQuery),
        1 => queries.into_iter().next().unwrap_or_else(|| Box::new(EmptyQuery)),
        _ => Box::new(BooleanQuery::union(queries)),
    }
}

/// Keyword query for one text field.
fn field_query(index: &Index, field: Field, keyword: &Keyword) -> Result<Box<dyn Query>, SearchError> {
    let query: Box<dyn Query> = match keyword.mode {
        SearchMode::Exact => {
            let tokens = analyze(index, field, &keyword.text)?;
            match tokens.len() {
                0 => Box::new(EmptyQuery),
                1 => term_query(field, &tokens[0]),
                _ => Box::new(PhraseQuery::new(
                    tokens
                        .iter()
                        .map(|t| Term::from_field_text(field, t))
                        .collect(),
                )),
            }
        }
        SearchMode::Words => {
            let tokens = analyze(index, field, &keyword.text)?;
            any_of(tokens.iter().map(|t| term_query(field, t)).collect())
        }
        SearchMode::Fuzzy => {
            let tokens = analyze(index, field, &keyword.text)?;
            any_of(
                tokens
                    .iter()
                    .map(|t| -> Box<dyn Query> {
                        Box::new(FuzzyTermQuery::new(
                            Term::from_field_text(field, t),
                            keyword.fuzziness,
                            true,
                        ))
                    })
                    .collect(),
            )
        }
        SearchMode::Regexp => {
            let pattern = format!("(?i){}", keyword.text);
            let query = RegexQuery::from_pattern(&pattern, field)
                .map_err(|e| SearchError::InvalidQuery(e.to_string()))?;
            Box::new(query)
        }
        // parsed across all fields at once in `keyword_query`
        SearchMode::Native => Box::new(EmptyQuery),
    };
    Ok(query)
}

/// Build the text part of a search over `fields`.
///
/// No keyword matches every document.
pub fn keyword_query(
    index: &Index,
    fields: &[Field],
    keyword: Option<&Keyword>,
) -> Result<Box<dyn Query>, SearchError> {
    let Some(keyword) = keyword else {
        return Ok(Box::new(AllQuery));
    };

    if keyword.mode == SearchMode::Native {
        let parser = QueryParser::for_index(index, fields.to_vec());
        return Ok(parser.parse_query(&keyword.text)?);
    }

    let per_field = fields
        .iter()
        .map(|field| field_query(index, *field, keyword))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(any_of(per_field))
}

/// Conjunction of queries; an empty list matches everything.
pub fn all_of(queries: Vec<Box<dyn Query>>) -> Box<dyn Query> {
    match queries.len() {
        0 => Box::new(AllQuery),
        1 => queries.into_iter().next().unwrap_or_else(|| Box::new(AllQuery)),
        _ => Box::new(BooleanQuery::intersection(queries)),
    }
}

/// Lower an issue filter tree.
pub fn filter_query(schema: &IssueSchema, filter: &Filter) -> Box<dyn Query> {
    match filter {
        Filter::Eq(field, value) => Box::new(TermQuery::new(
            Term::from_field_i64(schema.field(*field), *value),
            IndexRecordOption::Basic,
        )),
        Filter::Bool(field, value) => Box::new(TermQuery::new(
            Term::from_field_bool(schema.field(*field), *value),
            IndexRecordOption::Basic,
        )),
        Filter::In(field, values) => {
            let field = schema.field(*field);
            Box::new(TermSetQuery::new(
                values.iter().map(|v| Term::from_field_i64(field, *v)),
            ))
        }
        Filter::Range { field, gte, lte } => {
            let field = schema.field(*field);
            let bound = |value: &Option<i64>| match value {
                Some(v) => Bound::Included(Term::from_field_i64(field, *v)),
                None => Bound::Unbounded,
            };
            Box::new(RangeQuery::new(bound(gte), bound(lte)))
        }
        Filter::And(children) => all_of(
            children
                .iter()
                .map(|child| filter_query(schema, child))
                .collect(),
        ),
        Filter::Or(children) => Box::new(BooleanQuery::union(
            children
                .iter()
                .map(|child| filter_query(schema, child))
                .collect(),
        )),
        Filter::Not(inner) => Box::new(BooleanQuery::new(vec![
            (Occur::Must, Box::new(AllQuery) as Box<dyn Query>),
            (Occur::MustNot, filter_query(schema, inner)),
        ])),
    }
}
