//! Error types for ext-cli

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that can occur in CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Error from the engine
    #[error(transparent)]
    Core(#[from] ext_core::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Malformed version argument
    #[error("invalid version '{input}': {source}")]
    Version { input: String, source: semver::Error },

    /// User-facing error with a message
    #[error("{message}")]
    User { message: String },
}

impl CliError {
    /// Create a new user error with the given message
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }
}

/// Parse a version argument.
pub fn parse_version(input: &str) -> Result<semver::Version> {
    semver::Version::parse(input).map_err(|source| CliError::Version {
        input: input.to_string(),
        source,
    })
}
