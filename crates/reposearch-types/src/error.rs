//! Error types for settings handling.

use thiserror::Error;

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Layered configuration could not be built or deserialized
    #[error("Configuration error: {0}")]
    Load(String),

    /// A value was present but not acceptable
    #[error("Invalid setting: {0}")]
    Invalid(String),
}
