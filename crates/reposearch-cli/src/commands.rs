//! Command implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use reposearch_core::{Collaborators, ObjectStore};
use reposearch_service::{CodeSearchService, IssueSearchService};
use reposearch_types::{
    CodeSearchOptions, CodeSearchResults, IssueDocument, IssueSearchOptions, Paginator,
    SearchResult, Settings,
};

use crate::cli::{Commands, QueryArgs};
use crate::fs_store::FsObjectStore;

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(config_path: Option<&str>, log_level: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    Ok(settings)
}

pub fn init_logging(settings: &Settings) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level)),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

/// Build and initialize the code service. Also returns whether the index existed.
async fn open_code(
    settings: &Settings,
    store: Arc<dyn ObjectStore>,
) -> Result<(CodeSearchService, bool)> {
    let service = CodeSearchService::from_settings(&settings.code, store, Collaborators::default())
        .context("Failed to configure code indexer")?;
    let existed = service.init().await.context("Failed to initialize code indexer")?;
    Ok((service, existed))
}

async fn code_service(settings: &Settings, store: Arc<dyn ObjectStore>) -> Result<CodeSearchService> {
    Ok(open_code(settings, store).await?.0)
}

async fn open_issues(settings: &Settings) -> Result<(IssueSearchService, bool)> {
    let service = IssueSearchService::from_settings(&settings.issues)
        .context("Failed to configure issue indexer")?;
    let existed = service.init().await.context("Failed to initialize issue indexer")?;
    Ok((service, existed))
}

async fn issue_service(settings: &Settings) -> Result<IssueSearchService> {
    Ok(open_issues(settings).await?.0)
}

fn describe(existed: bool) -> &'static str {
    if existed {
        "existing"
    } else {
        "created"
    }
}

/// Object store for commands that never read blobs.
fn empty_store() -> Arc<dyn ObjectStore> {
    Arc::new(FsObjectStore::new("."))
}

pub async fn run(settings: Settings, command: Commands) -> Result<()> {
    match command {
        Commands::Init => init(&settings).await,
        Commands::Ping => ping(&settings).await,
        Commands::Index {
            dir,
            repo_id,
            commit,
            removed,
        } => index(&settings, &dir, repo_id, &commit, removed).await,
        Commands::Delete { repo_id } => {
            let service = code_service(&settings, empty_store()).await?;
            service.delete(repo_id).await?;
            service.close().await?;
            println!("Deleted repository {}", repo_id);
            Ok(())
        }
        Commands::Search {
            keyword,
            query,
            language,
        } => {
            let mut opts = CodeSearchOptions::new(keyword)
                .with_mode(query.mode)
                .with_fuzzy(query.fuzzy)
                .with_repo_ids(query.repo_ids.clone())
                .with_page(query.page, query.page_size);
            if let Some(language) = language {
                opts = opts.with_language(language);
            }
            let service = code_service(&settings, empty_store()).await?;
            let results = service.search(&opts).await?;
            service.close().await?;
            print_code_results(&results);
            Ok(())
        }
        Commands::IndexIssues { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file))?;
            let issues: Vec<IssueDocument> =
                serde_json::from_str(&raw).with_context(|| format!("Invalid issue file {}", file))?;
            let service = issue_service(&settings).await?;
            service.index(&issues).await?;
            service.close().await?;
            println!("Indexed {} issues", issues.len());
            Ok(())
        }
        Commands::SearchIssues {
            keyword,
            query,
            all_public,
            is_pull,
            is_closed,
            labels,
            excluded_labels,
            poster_id,
            assignee_id,
            sort,
        } => {
            let opts = IssueSearchOptions {
                search_mode: query.mode,
                fuzzy: query.fuzzy,
                all_public,
                is_pull,
                is_closed,
                included_label_ids: labels,
                excluded_label_ids: excluded_labels,
                poster_id,
                assignee_id,
                sort_by: sort,
                paginator: Some(paginator(&query)),
                repo_ids: query.repo_ids,
                ..IssueSearchOptions::new(keyword)
            };
            let service = issue_service(&settings).await?;
            let results = service.search(&opts).await?;
            service.close().await?;
            println!(
                "{}{} issues",
                results.total,
                if results.total_is_estimate { "+" } else { "" }
            );
            for hit in &results.hits {
                println!("  #{:<8} score {:.3}", hit.id, hit.score);
            }
            Ok(())
        }
    }
}

fn paginator(query: &QueryArgs) -> Paginator {
    Paginator::new(query.page, query.page_size)
}

async fn init(settings: &Settings) -> Result<()> {
    if settings.code.enabled {
        let (service, existed) = open_code(settings, empty_store()).await?;
        println!("code index ({}): {}", service.backend(), describe(existed));
        service.close().await?;
    }
    if settings.issues.enabled {
        let (service, existed) = open_issues(settings).await?;
        println!("issue index ({}): {}", service.backend(), describe(existed));
        service.close().await?;
    }
    Ok(())
}

async fn ping(settings: &Settings) -> Result<()> {
    let mut failed = false;
    if settings.code.enabled {
        let service = code_service(settings, empty_store()).await?;
        match service.ping().await {
            Ok(()) => println!("code ({}): ok", service.backend()),
            Err(e) => {
                failed = true;
                println!("code ({}): {}", service.backend(), e);
            }
        }
    }
    if settings.issues.enabled {
        let service = issue_service(settings).await?;
        match service.ping().await {
            Ok(()) => println!("issues ({}): ok", service.backend()),
            Err(e) => {
                failed = true;
                println!("issues ({}): {}", service.backend(), e);
            }
        }
    }
    if failed {
        bail!("one or more search backends are unavailable");
    }
    Ok(())
}

async fn index(
    settings: &Settings,
    dir: &str,
    repo_id: i64,
    commit: &str,
    removed: Vec<String>,
) -> Result<()> {
    let root = Path::new(dir)
        .canonicalize()
        .with_context(|| format!("Cannot open {}", dir))?;
    let store = FsObjectStore::new(&root);
    let mut changes = store
        .collect_changes()
        .with_context(|| format!("Failed to walk {}", root.display()))?;
    changes.removed_filenames = removed;
    info!(
        root = %root.display(),
        files = changes.updates.len(),
        removed = changes.removed_filenames.len(),
        "Collected changes"
    );

    let service = code_service(settings, Arc::new(store)).await?;
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current file");
                cancel.cancel();
            }
        })
    };
    let result = service.index(&cancel, repo_id, commit, &changes).await;
    watcher.abort();
    let stats = result?;
    service.close().await?;
    println!(
        "Indexed {} files, removed {}, skipped {}",
        stats.indexed, stats.deleted, stats.skipped
    );
    Ok(())
}

/// The line of `content` holding the match span.
fn match_line(hit: &SearchResult) -> &str {
    let content = hit.content.as_str();
    let start = hit.start_index.min(content.len());
    let line_start = content[..start].rfind('\n').map_or(0, |i| i + 1);
    let line_end = content[start..]
        .find('\n')
        .map_or(content.len(), |i| start + i);
    content[line_start..line_end].trim()
}

fn print_code_results(results: &CodeSearchResults) {
    println!(
        "{}{} results",
        results.total,
        if results.total_is_estimate { "+" } else { "" }
    );
    for hit in &results.hits {
        println!("{}:{} [{}]", hit.repo_id, hit.filename, hit.language);
        let line = match_line(hit);
        if !line.is_empty() {
            println!("    {}", line);
        }
    }
    if !results.languages.is_empty() {
        let facets: Vec<String> = results
            .languages
            .iter()
            .map(|l| format!("{} ({})", l.language, l.count))
            .collect();
        println!("languages: {}", facets.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(content: &str, start: usize) -> SearchResult {
        SearchResult {
            repo_id: 1,
            filename: "a.go".into(),
            commit_id: "c".into(),
            content: content.into(),
            language: "Go".into(),
            color: String::new(),
            updated_unix: 0,
            start_index: start,
            end_index: start,
        }
    }

    #[test]
    fn test_match_line() {
        let content = "package main\n\nfunc Foo() {}\n";
        assert_eq!(match_line(&hit(content, 19)), "func Foo() {}");
        assert_eq!(match_line(&hit(content, 0)), "package main");
        assert_eq!(match_line(&hit("single", 99)), "single");
    }
}
