//! Single-pass search over loaded repositories.

use std::collections::HashMap;

use regex::{Regex, RegexBuilder};

use reposearch_core::normalize::{find_ignore_ascii_case, language_facets, match_span};
use reposearch_core::{Keyword, LanguageClassifier};
use reposearch_types::{CodeDocument, CodeSearchResults, SearchMode, SearchResult};

use crate::error::TrigramError;
use crate::native::NativeQuery;
use crate::repo::RepoIndex;

/// A keyword compiled for repeated evaluation.
#[derive(Debug)]
pub enum Matcher {
    /// Blank keyword
    All,
    Substring(String),
    AnyWord(Vec<String>),
    /// Token scan within the keyword's edit distance
    Fuzzy(Keyword),
    Regex(Regex),
    Native(NativeQuery),
}

impl Matcher {
    pub fn compile(keyword: Option<&Keyword>) -> Result<Self, TrigramError> {
        let Some(keyword) = keyword else {
            return Ok(Matcher::All);
        };
        Ok(match keyword.mode {
            SearchMode::Exact => Matcher::Substring(keyword.text.clone()),
            SearchMode::Words => {
                Matcher::AnyWord(keyword.words().into_iter().map(str::to_string).collect())
            }
            SearchMode::Fuzzy => Matcher::Fuzzy(keyword.clone()),
            SearchMode::Regexp => Matcher::Regex(
                RegexBuilder::new(&keyword.text)
                    .case_insensitive(true)
                    .build()?,
            ),
            SearchMode::Native => Matcher::Native(NativeQuery::parse(&keyword.text)?),
        })
    }

    /// Ordinals worth verifying; `None` scans every document.
    fn prefilter(&self, repo: &RepoIndex) -> Option<Vec<u32>> {
        match self {
            Matcher::Substring(needle) => repo.candidates(needle),
            Matcher::AnyWord(words) => {
                let mut union = Vec::new();
                for word in words {
                    union.extend(repo.candidates(word)?);
                }
                union.sort_unstable();
                union.dedup();
                Some(union)
            }
            Matcher::Native(query) => {
                let mut narrowed: Option<Vec<u32>> = None;
                for needle in query.required_substrings() {
                    if let Some(found) = repo.candidates(needle) {
                        narrowed = Some(match narrowed {
                            None => found,
                            Some(prev) => prev.into_iter().filter(|o| found.binary_search(o).is_ok()).collect(),
                        });
                    }
                }
                narrowed
            }
            Matcher::All | Matcher::Fuzzy(_) | Matcher::Regex(_) => None,
        }
    }

    /// Span of the first match in `doc`, or `None` when it does not match.
    pub fn find(&self, doc: &CodeDocument) -> Option<(usize, usize)> {
        match self {
            Matcher::All => Some((0, 0)),
            Matcher::Substring(needle) => {
                find_ignore_ascii_case(&doc.content, needle).map(|s| (s, s + needle.len()))
            }
            Matcher::AnyWord(words) => words
                .iter()
                .filter_map(|w| find_ignore_ascii_case(&doc.content, w).map(|s| (s, s + w.len())))
                .min_by_key(|(start, _)| *start),
            Matcher::Fuzzy(keyword) => match_span(&doc.content, keyword),
            Matcher::Regex(re) => re
                .find_iter(&doc.content)
                .find(|m| !m.is_empty())
                .map(|m| (m.start(), m.end())),
            Matcher::Native(query) => query.find(doc),
        }
    }
}

/// Scope and paging of one request.
pub struct Scan<'a> {
    pub repo_ids: &'a [i64],
    pub language: Option<&'a str>,
    pub offset: usize,
    pub limit: usize,
}

/// Evaluate `matcher` over `repos` in one pass.
///
/// Hits come in repository id order, then filename order. Language counts
/// cover every match in scope; the language filter only narrows the hits
/// and the total.
pub fn scan(
    repos: &HashMap<i64, RepoIndex>,
    matcher: &Matcher,
    request: &Scan<'_>,
    languages: &dyn LanguageClassifier,
) -> CodeSearchResults {
    let mut repo_ids: Vec<i64> = if request.repo_ids.is_empty() {
        repos.keys().copied().collect()
    } else {
        request
            .repo_ids
            .iter()
            .copied()
            .filter(|id| repos.contains_key(id))
            .collect()
    };
    repo_ids.sort_unstable();
    repo_ids.dedup();

    let mut counts: HashMap<String, u64> = HashMap::new();
    let mut total = 0usize;
    let mut hits = Vec::new();

    for repo_id in repo_ids {
        let Some(repo) = repos.get(&repo_id) else {
            continue;
        };
        let ordinals: Box<dyn Iterator<Item = usize>> = match matcher.prefilter(repo) {
            Some(list) => Box::new(list.into_iter().map(|o| o as usize)),
            None => Box::new(0..repo.len()),
        };
        for ordinal in ordinals {
            let doc = &repo.docs()[ordinal];
            let Some((start, end)) = matcher.find(doc) else {
                continue;
            };
            *counts.entry(doc.language.clone()).or_default() += 1;
            if request.language.is_some_and(|l| l != doc.language) {
                continue;
            }
            total += 1;
            if total > request.offset && hits.len() < request.limit {
                hits.push(SearchResult {
                    repo_id: doc.repo_id,
                    filename: doc.filename.clone(),
                    commit_id: doc.commit_id.clone(),
                    content: doc.content.clone(),
                    language: doc.language.clone(),
                    color: languages.color(&doc.language).unwrap_or_default(),
                    updated_unix: doc.updated_at,
                    start_index: start,
                    end_index: end,
                });
            }
        }
    }

    CodeSearchResults {
        total: total as u64,
        total_is_estimate: false,
        hits,
        languages: language_facets(counts, languages),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reposearch_core::ExtensionClassifier;

    fn doc(repo_id: i64, filename: &str, language: &str, content: &str) -> CodeDocument {
        CodeDocument {
            repo_id,
            filename: filename.into(),
            language: language.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    fn repos() -> HashMap<i64, RepoIndex> {
        let mut repos = HashMap::new();
        repos.insert(
            1,
            RepoIndex::new(vec![
                doc(1, "a.rs", "Rust", "foo bar baz"),
                doc(1, "b.go", "Go", "hello world"),
            ]),
        );
        repos.insert(2, RepoIndex::new(vec![doc(2, "c.rs", "Rust", "let foo = 1;")]));
        repos
    }

    fn run(keyword: &str, mode: SearchMode, scope: Scan<'_>) -> CodeSearchResults {
        let keyword = Keyword::parse(keyword, mode);
        let matcher = Matcher::compile(keyword.as_ref()).unwrap();
        scan(&repos(), &matcher, &scope, &ExtensionClassifier)
    }

    fn everywhere() -> Scan<'static> {
        Scan {
            repo_ids: &[],
            language: None,
            offset: 0,
            limit: 100,
        }
    }

    #[test]
    fn test_exact_versus_words() {
        assert_eq!(run("foo qux", SearchMode::Words, everywhere()).total, 2);
        assert_eq!(run("foo qux", SearchMode::Exact, everywhere()).total, 0);
        let exact = run("BAR baz", SearchMode::Exact, everywhere());
        assert_eq!(exact.total, 1);
        assert_eq!((exact.hits[0].start_index, exact.hits[0].end_index), (4, 11));
    }

    #[test]
    fn test_fuzzy_and_regexp() {
        let fuzzy = run("wrold", SearchMode::Fuzzy, everywhere());
        assert_eq!(fuzzy.total, 1);
        assert_eq!((fuzzy.hits[0].start_index, fuzzy.hits[0].end_index), (6, 11));

        let regexp = run(r"let \w+ = \d", SearchMode::Regexp, everywhere());
        assert_eq!(regexp.total, 1);
        assert_eq!(regexp.hits[0].filename, "c.rs");
    }

    #[test]
    fn test_facets_ignore_language_filter() {
        let filtered = run(
            "o",
            SearchMode::Words,
            Scan {
                language: Some("Go"),
                ..everywhere()
            },
        );
        assert_eq!(filtered.total, 1);
        assert_eq!(filtered.hits[0].filename, "b.go");
        let facets: Vec<(&str, u64)> = filtered
            .languages
            .iter()
            .map(|l| (l.language.as_str(), l.count))
            .collect();
        assert_eq!(facets, vec![("Rust", 2), ("Go", 1)]);
    }

    #[test]
    fn test_scope_and_paging() {
        let scoped = run(
            "foo",
            SearchMode::Exact,
            Scan {
                repo_ids: &[2, 99],
                ..everywhere()
            },
        );
        assert_eq!(scoped.total, 1);
        assert_eq!(scoped.hits[0].repo_id, 2);

        let paged = run(
            "",
            SearchMode::Exact,
            Scan {
                offset: 1,
                limit: 1,
                ..everywhere()
            },
        );
        assert_eq!(paged.total, 3);
        assert_eq!(paged.hits.len(), 1);
        assert_eq!(paged.hits[0].filename, "b.go");
    }

    #[test]
    fn test_native() {
        let native = run("lang:rust foo -bar", SearchMode::Native, everywhere());
        assert_eq!(native.total, 1);
        assert_eq!(native.hits[0].filename, "c.rs");
    }
}
