//! Error types for tierwise.

use crate::router::SkippedCandidate;

/// Result type alias for tierwise operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tierwise.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Invalid profile '{profile}': expected one of cheap, balanced, premium")]
    InvalidProfile { profile: String },

    #[error("No configuration for profile '{profile}'")]
    NoProfileConfig { profile: String },

    #[error(
        "No fallback model available for profile '{profile}' ({} candidates skipped)",
        .skipped.len()
    )]
    NoFallbackModel {
        profile: String,
        skipped: Vec<SkippedCandidate>,
    },

    #[error("No provider found for model '{model}'")]
    NoProvider { model: String },

    #[error("Provider '{name}' is not registered")]
    ProviderNotFound { name: String },

    #[error("Invalid provider: {0}")]
    InvalidProvider(String),

    #[error("Model '{model}' has no registered cost rate")]
    ModelNotFound { model: String },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Whether this error came from the caller's cancellation token.
    ///
    /// Cancellation always aborts a routing call; every other provider
    /// error during traversal only disqualifies the candidate.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
