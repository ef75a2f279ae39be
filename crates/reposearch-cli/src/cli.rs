//! CLI argument parsing.

use clap::{Args, Parser, Subcommand};

use reposearch_types::{IssueSortBy, SearchMode};

/// Index and search repository content and issues.
#[derive(Parser, Debug)]
#[command(name = "reposearch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/reposearch/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create or open the configured indexes
    Init,

    /// Check that the configured backends answer
    Ping,

    /// Index a directory as one repository
    Index {
        /// Working tree to index
        dir: String,

        #[arg(long)]
        repo_id: i64,

        /// Commit id recorded on every document
        #[arg(long, default_value = "HEAD")]
        commit: String,

        /// Paths to remove from the index after indexing
        #[arg(long = "remove")]
        removed: Vec<String>,
    },

    /// Remove every document of a repository from the code index
    Delete {
        #[arg(long)]
        repo_id: i64,
    },

    /// Search indexed code
    Search {
        keyword: String,

        #[command(flatten)]
        query: QueryArgs,

        /// Only return hits in this language
        #[arg(long)]
        language: Option<String>,
    },

    /// Load issues from a JSON array file into the issue index
    IndexIssues {
        /// File holding a JSON array of issues
        file: String,
    },

    /// Search indexed issues
    SearchIssues {
        keyword: String,

        #[command(flatten)]
        query: QueryArgs,

        /// Also match public issues outside the given repositories
        #[arg(long)]
        all_public: bool,

        /// Only pull requests (true) or only issues (false)
        #[arg(long)]
        is_pull: Option<bool>,

        /// Only closed (true) or only open (false)
        #[arg(long)]
        is_closed: Option<bool>,

        /// Require every one of these labels
        #[arg(long = "label")]
        labels: Vec<i64>,

        /// Exclude these labels
        #[arg(long = "exclude-label")]
        excluded_labels: Vec<i64>,

        #[arg(long)]
        poster_id: Option<i64>,

        #[arg(long)]
        assignee_id: Option<i64>,

        /// Sort order: relevance, newest, oldest, recentupdate, leastupdate,
        /// mostcomment, leastcomment, nearduedate, farduedate
        #[arg(long, default_value = "relevance")]
        sort: IssueSortBy,
    },
}

/// Options shared by both search commands.
#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Search mode: exact, words, fuzzy, regexp, native
    #[arg(long, default_value = "exact")]
    pub mode: SearchMode,

    /// Allow typos (overrides exact and words)
    #[arg(long)]
    pub fuzzy: bool,

    /// Restrict to these repositories
    #[arg(long = "repo-id")]
    pub repo_ids: Vec<i64>,

    #[arg(long, default_value = "1")]
    pub page: usize,

    /// Hits per page; 0 only counts
    #[arg(long, default_value = "20")]
    pub page_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search() {
        let cli = Cli::parse_from([
            "reposearch", "search", "Foo", "--repo-id", "1", "--repo-id", "2", "--mode", "words",
            "--language", "Go",
        ]);
        match cli.command {
            Commands::Search {
                keyword,
                query,
                language,
            } => {
                assert_eq!(keyword, "Foo");
                assert_eq!(query.repo_ids, vec![1, 2]);
                assert_eq!(query.mode, SearchMode::Words);
                assert_eq!(query.page_size, 20);
                assert_eq!(language.as_deref(), Some("Go"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_index_with_removals() {
        let cli = Cli::parse_from([
            "reposearch", "-l", "debug", "index", ".", "--repo-id", "7", "--remove", "old.rs",
        ]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Commands::Index {
                repo_id, removed, commit, ..
            } => {
                assert_eq!(repo_id, 7);
                assert_eq!(removed, vec!["old.rs"]);
                assert_eq!(commit, "HEAD");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_issue_sort() {
        let cli = Cli::parse_from(["reposearch", "search-issues", "crash", "--sort", "newest"]);
        match cli.command {
            Commands::SearchIssues { sort, .. } => assert_eq!(sort, IssueSortBy::CreatedDesc),
            other => panic!("unexpected command {:?}", other),
        }
    }
}
