//! # reposearch-cli
//!
//! Command-line front end: builds the configured code and issue services,
//! walks a working tree as a repository and prints search results.

pub mod cli;
pub mod commands;
pub mod fs_store;

pub use cli::{Cli, Commands, QueryArgs};
pub use commands::{init_logging, load_settings, run};
pub use fs_store::FsObjectStore;
