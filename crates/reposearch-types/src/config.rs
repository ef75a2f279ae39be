//! Configuration loading for reposearch.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `~/.config/reposearch/config.toml`.

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Backend used for code search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CodeEngine {
    /// Embedded tantivy index (default)
    #[default]
    Tantivy,
    #[serde(alias = "elastic")]
    Elasticsearch,
    #[serde(alias = "meili")]
    Meilisearch,
    /// Sharded substring/regex index
    Trigram,
    /// Accepts everything, matches nothing (requires the `noop` feature)
    Noop,
}

/// Backend used for issue search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueEngine {
    #[default]
    Tantivy,
    #[serde(alias = "elastic")]
    Elasticsearch,
    #[serde(alias = "meili")]
    Meilisearch,
    /// Plain SQL over a SQLite side table
    #[serde(alias = "db")]
    Sql,
    Noop,
}

/// Elasticsearch wire protocol flavor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ElasticFlavor {
    V7,
    #[default]
    V8,
}

/// Code indexer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeIndexerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub engine: CodeEngine,

    /// Index directory for the embedded and trigram engines
    #[serde(default = "default_code_index_path")]
    pub path: String,

    /// Base URL of a remote engine; may carry basic-auth credentials
    #[serde(default = "default_remote_url")]
    pub url: String,

    /// Index name (remote engines); a version suffix is appended
    #[serde(default = "default_code_index_name")]
    pub index_name: String,

    /// API key for remote engines (loaded from env var, not stored in config file)
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub es_flavor: ElasticFlavor,

    /// Operations per write batch before a flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Files larger than this many bytes are removed from the index
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Skip vendored and generated paths
    #[serde(default = "default_true")]
    pub exclude_vendored: bool,

    /// When non-empty, only paths matching one of these globs are indexed
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Paths matching any of these globs are never indexed
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// How long searches wait for the indexer to become ready
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Writer memory budget of the embedded engine
    #[serde(default = "default_writer_memory_mb")]
    pub writer_memory_mb: usize,

    /// Maximum content bytes per trigram shard file
    #[serde(default = "default_shard_max_bytes")]
    pub shard_max_bytes: u64,
}

/// Issue indexer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueIndexerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub engine: IssueEngine,

    #[serde(default = "default_issue_index_path")]
    pub path: String,

    #[serde(default = "default_remote_url")]
    pub url: String,

    #[serde(default = "default_issue_index_name")]
    pub index_name: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default)]
    pub es_flavor: ElasticFlavor,

    /// Connection string of the SQL fallback
    #[serde(default = "default_database_url")]
    pub database_url: String,

    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_writer_memory_mb")]
    pub writer_memory_mb: usize,
}

fn default_true() -> bool {
    true
}

fn data_dir() -> PathBuf {
    ProjectDirs::from("", "", "reposearch")
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn default_code_index_path() -> String {
    data_dir().join("code-index").to_string_lossy().to_string()
}

fn default_issue_index_path() -> String {
    data_dir().join("issue-index").to_string_lossy().to_string()
}

fn default_database_url() -> String {
    format!(
        "sqlite://{}?mode=rwc",
        data_dir().join("issues.db").to_string_lossy()
    )
}

fn default_remote_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_code_index_name() -> String {
    "reposearch_codes".to_string()
}

fn default_issue_index_name() -> String {
    "reposearch_issues".to_string()
}

fn default_batch_size() -> usize {
    16
}

fn default_max_file_size() -> u64 {
    1024 * 1024
}

fn default_startup_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_writer_memory_mb() -> usize {
    50
}

fn default_shard_max_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CodeIndexerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: CodeEngine::default(),
            path: default_code_index_path(),
            url: default_remote_url(),
            index_name: default_code_index_name(),
            api_key: None,
            es_flavor: ElasticFlavor::default(),
            batch_size: default_batch_size(),
            max_file_size: default_max_file_size(),
            exclude_vendored: true,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            startup_timeout_secs: default_startup_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            writer_memory_mb: default_writer_memory_mb(),
            shard_max_bytes: default_shard_max_bytes(),
        }
    }
}

impl CodeIndexerSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("code.batch_size must be > 0".to_string());
        }
        if self.max_file_size == 0 {
            return Err("code.max_file_size must be > 0".to_string());
        }
        if self.shard_max_bytes == 0 {
            return Err("code.shard_max_bytes must be > 0".to_string());
        }
        if self.index_name.trim().is_empty() {
            return Err("code.index_name must not be empty".to_string());
        }
        Ok(())
    }
}

impl Default for IssueIndexerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: IssueEngine::default(),
            path: default_issue_index_path(),
            url: default_remote_url(),
            index_name: default_issue_index_name(),
            api_key: None,
            es_flavor: ElasticFlavor::default(),
            database_url: default_database_url(),
            startup_timeout_secs: default_startup_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            writer_memory_mb: default_writer_memory_mb(),
        }
    }
}

impl IssueIndexerSettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.index_name.trim().is_empty() {
            return Err("issues.index_name must not be empty".to_string());
        }
        if self.engine == IssueEngine::Sql && self.database_url.trim().is_empty() {
            return Err("issues.database_url is required by the sql engine".to_string());
        }
        Ok(())
    }
}

/// Main application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub code: CodeIndexerSettings,

    #[serde(default)]
    pub issues: IssueIndexerSettings,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/reposearch/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (REPOSEARCH_*, nested keys joined by `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ConfigError> {
        let config_dir = ProjectDirs::from("", "", "reposearch")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("log_level", default_log_level())
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .set_default("code.path", default_code_index_path())
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .set_default("issues.path", default_issue_index_path())
            .map_err(|e| ConfigError::Load(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: REPOSEARCH_LOG_LEVEL, REPOSEARCH_CODE__ENGINE, REPOSEARCH_ISSUES__URL, etc.
        builder = builder.add_source(
            Environment::with_prefix("REPOSEARCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("code.include_patterns")
                .with_list_parse_key("code.exclude_patterns"),
        );

        let config = builder
            .build()
            .map_err(|e| ConfigError::Load(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.code.validate().map_err(ConfigError::Invalid)?;
        self.issues.validate().map_err(ConfigError::Invalid)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.code.engine, CodeEngine::Tantivy);
        assert_eq!(settings.code.max_file_size, 1024 * 1024);
        assert_eq!(settings.code.batch_size, 16);
        assert!(settings.code.exclude_vendored);
        assert_eq!(settings.issues.engine, IssueEngine::Tantivy);
        assert_eq!(settings.issues.es_flavor, ElasticFlavor::V8);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"

[code]
engine = "trigram"
path = "/tmp/reposearch-code"
include_patterns = ["*.go", "*.rs"]

[issues]
engine = "elastic"
es_flavor = "v7"
"#
        )
        .unwrap();

        let settings = Settings::load(Some(&file.path().to_string_lossy())).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.code.engine, CodeEngine::Trigram);
        assert_eq!(settings.code.path, "/tmp/reposearch-code");
        assert_eq!(settings.code.include_patterns, vec!["*.go", "*.rs"]);
        assert_eq!(settings.code.batch_size, 16);
        assert_eq!(settings.issues.engine, IssueEngine::Elasticsearch);
        assert_eq!(settings.issues.es_flavor, ElasticFlavor::V7);
    }

    #[test]
    fn test_validation_rejects_zero_batch() {
        let mut settings = Settings::default();
        settings.code.batch_size = 0;
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_cli_config_is_error() {
        let result = Settings::load(Some("/nonexistent/reposearch/config.toml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
