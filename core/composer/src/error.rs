use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a build run. Any of these leaves the previously
/// published documents untouched.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("no input records")]
    NoRecords,

    #[error("schema validation failed with {} error(s): {}", .0.len(), .0.join("; "))]
    Schema(Vec<String>),

    #[error("privacy audit failed with {} violation(s): {}", .0.len(), .0.join("; "))]
    Privacy(Vec<String>),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl FatalError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> u8 {
        match self {
            FatalError::NoRecords => 2,
            FatalError::Schema(_) => 3,
            FatalError::Privacy(_) => 4,
            FatalError::Unexpected(_) => 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
