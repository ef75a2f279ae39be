//! Service E2E tests: configuration file to search results.
//!
//! Settings are written as a TOML file and loaded the way the command line
//! loads them, then a working tree on disk is indexed through the service
//! facade.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use reposearch_cli::{load_settings, FsObjectStore};
use reposearch_core::Collaborators;
use reposearch_service::{CodeSearchService, IssueSearchService, ServiceError};
use reposearch_types::{
    CodeEngine, CodeSearchOptions, IssueDocument, IssueEngine, IssueSearchOptions, SearchMode,
    Settings,
};

fn write_tree(root: &Path) {
    fs::create_dir_all(root.join("cmd")).unwrap();
    fs::create_dir_all(root.join("vendor/dep")).unwrap();
    fs::write(root.join("cmd/main.go"), "package main\n\nfunc Foo() {}\n").unwrap();
    fs::write(root.join("lib.rs"), "pub fn foo_bar() -> u32 { 42 }\n").unwrap();
    fs::write(root.join("vendor/dep/dep.go"), "func Foo() {}\n").unwrap();
}

/// Write `settings` to a config file and load it back.
fn load_via_file(dir: &Path, settings: &Settings) -> Settings {
    let path = dir.join("config.toml");
    fs::write(&path, toml::to_string(settings).unwrap()).unwrap();
    load_settings(Some(path.to_str().unwrap()), Some("debug")).unwrap()
}

fn settings_in(dir: &Path, code: CodeEngine, issues: IssueEngine) -> Settings {
    let mut settings = Settings::default();
    settings.code.engine = code;
    settings.code.path = dir.join("code").to_string_lossy().to_string();
    settings.issues.engine = issues;
    settings.issues.path = dir.join("issues").to_string_lossy().to_string();
    settings.issues.database_url = format!("sqlite://{}", dir.join("issues.db").display());
    settings
}

#[tokio::test]
async fn test_index_working_tree_through_service() {
    for engine in [CodeEngine::Tantivy, CodeEngine::Trigram] {
        let temp = tempfile::TempDir::new().unwrap();
        let tree = temp.path().join("tree");
        write_tree(&tree);

        let settings = load_via_file(
            temp.path(),
            &settings_in(temp.path(), engine, IssueEngine::Tantivy),
        );
        assert_eq!(settings.code.engine, engine);
        assert_eq!(settings.log_level, "debug");

        let store = FsObjectStore::new(&tree);
        let changes = store.collect_changes().unwrap();
        assert_eq!(changes.updates.len(), 3);

        let service =
            CodeSearchService::from_settings(&settings.code, Arc::new(store), Collaborators::default())
                .unwrap();
        assert!(!service.init().await.unwrap());
        service.ping().await.unwrap();

        let stats = service
            .index(&CancellationToken::new(), 9, "HEAD", &changes)
            .await
            .unwrap();
        assert_eq!((stats.indexed, stats.skipped), (2, 1), "{:?}", engine);

        let results = service
            .search(&CodeSearchOptions::new("func Foo()"))
            .await
            .unwrap();
        assert_eq!(results.total, 1, "{:?}", engine);
        let hit = &results.hits[0];
        assert_eq!(hit.filename, "cmd/main.go");
        assert_eq!(hit.language, "Go");
        assert_eq!(&hit.content[hit.start_index..hit.end_index], "func Foo()");

        let words = service
            .search(&CodeSearchOptions::new("u32 nowhere").with_mode(SearchMode::Words))
            .await
            .unwrap();
        assert_eq!(words.total, 1, "{:?}", engine);
        assert_eq!(words.hits[0].filename, "lib.rs");

        service.delete(9).await.unwrap();
        let gone = service.search(&CodeSearchOptions::new("Foo")).await.unwrap();
        assert_eq!(gone.total, 0, "{:?}", engine);
        service.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_issue_service_from_config_file() {
    for engine in [IssueEngine::Tantivy, IssueEngine::Sql] {
        let temp = tempfile::TempDir::new().unwrap();
        let settings = load_via_file(
            temp.path(),
            &settings_in(temp.path(), CodeEngine::Tantivy, engine),
        );

        let service = IssueSearchService::from_settings(&settings.issues).unwrap();
        service.init().await.unwrap();
        service
            .index(&[
                IssueDocument {
                    id: 1,
                    repo_id: 1,
                    title: "Login page crashes".into(),
                    ..Default::default()
                },
                IssueDocument {
                    id: 2,
                    repo_id: 1,
                    title: "Dark theme".into(),
                    comments: vec!["crashes on startup too".into()],
                    ..Default::default()
                },
            ])
            .await
            .unwrap();

        let mut ids = service
            .search(&IssueSearchOptions::new("crashes"))
            .await
            .unwrap()
            .ids();
        ids.sort();
        assert_eq!(ids, vec![1, 2], "{:?}", engine);
        service.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_disabled_and_not_ready() {
    let temp = tempfile::TempDir::new().unwrap();
    let mut settings = settings_in(temp.path(), CodeEngine::Tantivy, IssueEngine::Tantivy);

    settings.code.enabled = false;
    let err = CodeSearchService::from_settings(
        &settings.code,
        Arc::new(FsObjectStore::new(temp.path())),
        Collaborators::default(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, ServiceError::Disabled("code")));

    settings.issues.startup_timeout_secs = 0;
    let service = IssueSearchService::from_settings(&settings.issues).unwrap();
    let err = service
        .search(&IssueSearchOptions::new("anything"))
        .await
        .unwrap_err();
    assert!(err.is_search_unavailable());
    assert_eq!(
        err.to_string(),
        "search unavailable: issue indexer is not ready"
    );
}
