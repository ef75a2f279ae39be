//! reposearch
//!
//! Index repositories and issues into a pluggable search backend and query them.
//!
//! # Usage
//!
//! ```bash
//! reposearch init
//! reposearch index ./checkout --repo-id 1 [--commit SHA] [--remove PATH]
//! reposearch search "func Foo" [--mode words] [--fuzzy] [--language Go]
//! reposearch index-issues issues.json
//! reposearch search-issues crash [--is-closed false] [--sort newest]
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/reposearch/config.toml)
//! 3. Environment variables (REPOSEARCH_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use reposearch_cli::{init_logging, load_settings, run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref(), cli.log_level.as_deref())?;
    init_logging(&settings)?;
    run(settings, cli.command).await
}
