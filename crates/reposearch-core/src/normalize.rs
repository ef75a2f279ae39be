//! Result normalization shared by every adapter.
//!
//! Backends return stored documents; this module turns them into
//! `SearchResult`s with a `[start, end)` byte span for the first match and
//! builds the language facet.

use regex::RegexBuilder;

use reposearch_types::{CodeDocument, SearchMode, SearchResult, SearchResultLanguages};

use crate::extract::LanguageClassifier;
use crate::query::{split_terms, Keyword};

/// Number of language buckets returned with a search.
pub const LANGUAGE_FACET_LIMIT: usize = 10;

/// Byte offset of `needle` in `haystack`, ignoring ASCII case.
pub fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let (h, n) = (haystack.as_bytes(), needle.as_bytes());
    if n.is_empty() || n.len() > h.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

/// Optimal string alignment distance: Levenshtein plus adjacent transpositions.
pub fn osa_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    let mut d = vec![vec![0usize; m + 1]; n + 1];
    for (i, row) in d.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=m {
        d[0][j] = j;
    }
    for i in 1..=n {
        for j in 1..=m {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut best = (d[i - 1][j] + 1)
                .min(d[i][j - 1] + 1)
                .min(d[i - 1][j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(d[i - 2][j - 2] + 1);
            }
            d[i][j] = best;
        }
    }
    d[n][m]
}

/// Alphanumeric runs of `text` with their byte spans.
fn tokens(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let mut start = None;
    let mut out = Vec::new();
    for (i, c) in text.char_indices() {
        match (c.is_alphanumeric(), start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                out.push((s, &text[s..i]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((s, &text[s..]));
    }
    out.into_iter()
}

fn earliest<'a>(content: &str, needles: impl IntoIterator<Item = &'a str>) -> Option<(usize, usize)> {
    needles
        .into_iter()
        .filter_map(|n| find_ignore_ascii_case(content, n).map(|start| (start, start + n.len())))
        .min_by_key(|(start, _)| *start)
}

/// Locate the first match of `keyword` in `content`.
pub fn match_span(content: &str, keyword: &Keyword) -> Option<(usize, usize)> {
    match keyword.mode {
        SearchMode::Exact => earliest(content, [keyword.text.as_str()]).or_else(|| {
            let terms = keyword.terms();
            earliest(content, terms.iter().map(String::as_str))
        }),
        SearchMode::Words => earliest(content, keyword.words()),
        SearchMode::Fuzzy => {
            let terms = keyword.terms();
            let max = keyword.fuzziness as usize;
            tokens(content)
                .find(|(_, token)| {
                    let token = token.to_lowercase();
                    terms.iter().any(|t| osa_distance(&token, t) <= max)
                })
                .map(|(start, token)| (start, start + token.len()))
        }
        SearchMode::Regexp => RegexBuilder::new(&keyword.text)
            .case_insensitive(true)
            .build()
            .ok()?
            .find(content)
            .filter(|m| !m.is_empty())
            .map(|m| (m.start(), m.end())),
        SearchMode::Native => {
            let terms: Vec<String> = split_terms(&keyword.text)
                .into_iter()
                .filter(|t| !matches!(t.as_str(), "and" | "or" | "not"))
                .collect();
            earliest(content, terms.iter().map(String::as_str))
        }
    }
}

/// Turn a stored document into a normalized hit.
pub fn search_result(
    doc: CodeDocument,
    keyword: Option<&Keyword>,
    languages: &dyn LanguageClassifier,
) -> SearchResult {
    let (start_index, end_index) = keyword
        .and_then(|k| match_span(&doc.content, k))
        .unwrap_or((0, 0));
    let color = languages.color(&doc.language).unwrap_or_default();
    SearchResult {
        repo_id: doc.repo_id,
        filename: doc.filename,
        commit_id: doc.commit_id,
        content: doc.content,
        color,
        language: doc.language,
        updated_unix: doc.updated_at,
        start_index,
        end_index,
    }
}

/// Build the language facet from per-language counts.
///
/// Unknown (empty) languages are dropped; buckets are ordered by count,
/// then name, and capped at [`LANGUAGE_FACET_LIMIT`].
pub fn language_facets(
    counts: impl IntoIterator<Item = (String, u64)>,
    languages: &dyn LanguageClassifier,
) -> Vec<SearchResultLanguages> {
    let mut facets: Vec<SearchResultLanguages> = counts
        .into_iter()
        .filter(|(language, count)| !language.is_empty() && *count > 0)
        .map(|(language, count)| SearchResultLanguages {
            color: languages.color(&language).unwrap_or_default(),
            language,
            count,
        })
        .collect();
    facets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.language.cmp(&b.language)));
    facets.truncate(LANGUAGE_FACET_LIMIT);
    facets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtensionClassifier;
    use pretty_assertions::assert_eq;

    fn span(content: &str, keyword: &str, mode: SearchMode) -> Option<(usize, usize)> {
        match_span(content, &Keyword::parse(keyword, mode).unwrap())
    }

    #[test]
    fn test_osa_distance() {
        assert_eq!(osa_distance("world", "world"), 0);
        assert_eq!(osa_distance("wrold", "world"), 1);
        assert_eq!(osa_distance("word", "world"), 1);
        assert_eq!(osa_distance("kitten", "sitting"), 3);
        assert_eq!(osa_distance("", "abc"), 3);
    }

    #[test]
    fn test_exact_span() {
        assert_eq!(span("function Foo() {}", "Foo", SearchMode::Exact), Some((9, 12)));
        assert_eq!(span("function foo() {}", "FOO", SearchMode::Exact), Some((9, 12)));
        assert_eq!(span("nothing here", "Foo", SearchMode::Exact), None);
    }

    #[test]
    fn test_words_span_is_earliest() {
        assert_eq!(span("foo bar baz", "qux baz", SearchMode::Words), Some((8, 11)));
    }

    #[test]
    fn test_fuzzy_span() {
        assert_eq!(span("hello world", "wrold", SearchMode::Fuzzy), Some((6, 11)));
    }

    #[test]
    fn test_regexp_span() {
        assert_eq!(span("let x = 42;", r"\d+", SearchMode::Regexp), Some((8, 10)));
        assert_eq!(span("abc", "(", SearchMode::Regexp), None);
    }

    #[test]
    fn test_non_ascii_content_offsets() {
        let content = "é foo";
        let (s, e) = span(content, "foo", SearchMode::Exact).unwrap();
        assert_eq!(&content[s..e], "foo");
    }

    #[test]
    fn test_language_facets() {
        let facets = language_facets(
            vec![
                ("Go".to_string(), 2),
                ("".to_string(), 9),
                ("Rust".to_string(), 3),
                ("C".to_string(), 2),
            ],
            &ExtensionClassifier,
        );
        let names: Vec<(&str, u64)> = facets
            .iter()
            .map(|f| (f.language.as_str(), f.count))
            .collect();
        assert_eq!(names, vec![("Rust", 3), ("C", 2), ("Go", 2)]);
        assert_eq!(facets[0].color, "#dea584");
    }

    #[test]
    fn test_search_result_without_match() {
        let doc = CodeDocument {
            repo_id: 1,
            commit_id: "c".into(),
            filename: "a.go".into(),
            content: "package main".into(),
            language: "Go".into(),
            updated_at: 5,
        };
        let hit = search_result(doc, None, &ExtensionClassifier);
        assert_eq!((hit.start_index, hit.end_index), (0, 0));
        assert_eq!(hit.color, "#00ADD8");
        assert_eq!(hit.updated_unix, 5);
    }
}
