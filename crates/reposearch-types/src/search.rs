//! Search options and normalized results shared by every backend.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Upper bound on the number of hits one request may page through.
pub const MAX_RESULT_WINDOW: usize = 10_000;

/// How a keyword is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Escaped literal phrase or substring
    #[default]
    Exact,
    /// Whitespace separated tokens, any of which may match
    Words,
    /// Tokens matched within a bounded edit distance
    Fuzzy,
    /// Regular expression in the backend's dialect
    Regexp,
    /// Backend query syntax passed through untouched
    Native,
}

impl SearchMode {
    pub const ALL: [SearchMode; 5] = [
        SearchMode::Exact,
        SearchMode::Words,
        SearchMode::Fuzzy,
        SearchMode::Regexp,
        SearchMode::Native,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Exact => "exact",
            SearchMode::Words => "words",
            SearchMode::Fuzzy => "fuzzy",
            SearchMode::Regexp => "regexp",
            SearchMode::Native => "native",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(SearchMode::Exact),
            "words" => Ok(SearchMode::Words),
            "fuzzy" => Ok(SearchMode::Fuzzy),
            "regexp" | "regex" => Ok(SearchMode::Regexp),
            "native" => Ok(SearchMode::Native),
            other => Err(format!("unknown search mode: {}", other)),
        }
    }
}

/// Resolve the mode actually used for a request.
///
/// `regexp` and `native` are taken as given; otherwise the legacy fuzzy
/// flag forces fuzzy matching.
pub fn effective_mode(mode: SearchMode, fuzzy: bool) -> SearchMode {
    match mode {
        SearchMode::Regexp | SearchMode::Native => mode,
        _ if fuzzy => SearchMode::Fuzzy,
        _ => mode,
    }
}

/// 1-based page selection.
///
/// A `page_size` of 0 asks for the total only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paginator {
    pub page: usize,
    pub page_size: usize,
}

impl Paginator {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self { page, page_size }
    }

    pub fn offset(&self) -> usize {
        self.page.max(1).saturating_sub(1).saturating_mul(self.page_size)
    }

    /// Resolve an optional paginator into `(offset, limit)`.
    ///
    /// `None` lists everything up to [`MAX_RESULT_WINDOW`].
    pub fn window(paginator: Option<&Paginator>) -> (usize, usize) {
        match paginator {
            None => (0, MAX_RESULT_WINDOW),
            Some(p) => {
                let offset = p.offset().min(MAX_RESULT_WINDOW);
                let limit = p.page_size.min(MAX_RESULT_WINDOW - offset);
                (offset, limit)
            }
        }
    }
}

/// A code search request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSearchOptions {
    pub keyword: String,
    /// Legacy switch that turns exact/words into fuzzy matching
    #[serde(default)]
    pub fuzzy: bool,
    #[serde(default)]
    pub search_mode: SearchMode,
    /// Allow-list of repositories; empty means all
    #[serde(default)]
    pub repo_ids: Vec<i64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub paginator: Option<Paginator>,
}

impl CodeSearchOptions {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            ..Default::default()
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.search_mode = mode;
        self
    }

    pub fn with_fuzzy(mut self, fuzzy: bool) -> Self {
        self.fuzzy = fuzzy;
        self
    }

    pub fn with_repo_ids(mut self, repo_ids: Vec<i64>) -> Self {
        self.repo_ids = repo_ids;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_page(mut self, page: usize, page_size: usize) -> Self {
        self.paginator = Some(Paginator::new(page, page_size));
        self
    }

    pub fn mode(&self) -> SearchMode {
        effective_mode(self.search_mode, self.fuzzy)
    }

    /// Language filter with blank values treated as absent.
    pub fn language_filter(&self) -> Option<&str> {
        self.language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }
}

/// Sort orders available to issue search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSortBy {
    /// Relevance, ties broken by id descending
    #[default]
    Score,
    CreatedDesc,
    CreatedAsc,
    UpdatedDesc,
    UpdatedAsc,
    CommentsDesc,
    CommentsAsc,
    DeadlineDesc,
    DeadlineAsc,
}

impl IssueSortBy {
    /// Sort field and whether it is descending; `None` for relevance.
    pub fn field(&self) -> Option<(&'static str, bool)> {
        match self {
            IssueSortBy::Score => None,
            IssueSortBy::CreatedDesc => Some(("created_unix", true)),
            IssueSortBy::CreatedAsc => Some(("created_unix", false)),
            IssueSortBy::UpdatedDesc => Some(("updated_unix", true)),
            IssueSortBy::UpdatedAsc => Some(("updated_unix", false)),
            IssueSortBy::CommentsDesc => Some(("comment_count", true)),
            IssueSortBy::CommentsAsc => Some(("comment_count", false)),
            IssueSortBy::DeadlineDesc => Some(("deadline_unix", true)),
            IssueSortBy::DeadlineAsc => Some(("deadline_unix", false)),
        }
    }
}

impl FromStr for IssueSortBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "score" | "relevance" => Ok(IssueSortBy::Score),
            "newest" | "created_desc" => Ok(IssueSortBy::CreatedDesc),
            "oldest" | "created_asc" => Ok(IssueSortBy::CreatedAsc),
            "recentupdate" | "updated_desc" => Ok(IssueSortBy::UpdatedDesc),
            "leastupdate" | "updated_asc" => Ok(IssueSortBy::UpdatedAsc),
            "mostcomment" | "comments_desc" => Ok(IssueSortBy::CommentsDesc),
            "leastcomment" | "comments_asc" => Ok(IssueSortBy::CommentsAsc),
            "farduedate" | "deadline_desc" => Ok(IssueSortBy::DeadlineDesc),
            "nearduedate" | "deadline_asc" => Ok(IssueSortBy::DeadlineAsc),
            other => Err(format!("unknown sort order: {}", other)),
        }
    }
}

/// An issue search request.
///
/// `None` leaves a filter unset. For `project_id`, `project_column_id`,
/// `poster_id` and `assignee_id`, `Some(0)` selects issues without one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSearchOptions {
    pub keyword: String,
    #[serde(default)]
    pub search_mode: SearchMode,
    #[serde(default)]
    pub fuzzy: bool,

    #[serde(default)]
    pub repo_ids: Vec<i64>,
    /// Also match every public repository
    #[serde(default)]
    pub all_public: bool,

    pub is_pull: Option<bool>,
    pub is_closed: Option<bool>,

    /// Only issues without labels; overrides the label id lists
    #[serde(default)]
    pub no_label_only: bool,
    #[serde(default)]
    pub included_label_ids: Vec<i64>,
    #[serde(default)]
    pub included_any_label_ids: Vec<i64>,
    #[serde(default)]
    pub excluded_label_ids: Vec<i64>,

    /// `[0]` selects issues without a milestone
    #[serde(default)]
    pub milestone_ids: Vec<i64>,

    pub project_id: Option<i64>,
    pub project_column_id: Option<i64>,
    pub poster_id: Option<i64>,
    pub assignee_id: Option<i64>,
    pub mention_id: Option<i64>,
    pub reviewed_id: Option<i64>,
    pub review_requested_id: Option<i64>,
    pub subscriber_id: Option<i64>,

    /// Inclusive lower bound on `updated_unix`
    pub updated_after_unix: Option<i64>,
    /// Inclusive upper bound on `updated_unix`
    pub updated_before_unix: Option<i64>,

    #[serde(default)]
    pub paginator: Option<Paginator>,
    #[serde(default)]
    pub sort_by: IssueSortBy,
}

impl IssueSearchOptions {
    pub fn new(keyword: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            ..Default::default()
        }
    }

    pub fn mode(&self) -> SearchMode {
        effective_mode(self.search_mode, self.fuzzy)
    }
}

/// A normalized code search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub repo_id: i64,
    pub filename: String,
    pub commit_id: String,
    pub content: String,
    pub language: String,
    pub color: String,
    pub updated_unix: i64,
    /// Byte offset where the first match starts
    pub start_index: usize,
    /// Byte offset one past the first match
    pub end_index: usize,
}

/// One bucket of the language facet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResultLanguages {
    pub language: String,
    pub color: String,
    pub count: u64,
}

/// Code search response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSearchResults {
    pub total: u64,
    /// True when `total` is a backend estimate rather than an exact count
    pub total_is_estimate: bool,
    pub hits: Vec<SearchResult>,
    pub languages: Vec<SearchResultLanguages>,
}

/// One issue search hit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IssueMatch {
    pub id: i64,
    pub score: f32,
}

/// Issue search response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssueSearchResults {
    pub total: u64,
    pub total_is_estimate: bool,
    pub hits: Vec<IssueMatch>,
}

impl IssueSearchResults {
    pub fn ids(&self) -> Vec<i64> {
        self.hits.iter().map(|h| h.id).collect()
    }
}
