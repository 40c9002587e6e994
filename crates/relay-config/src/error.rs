use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {0}: {1}")]
    IoError(PathBuf, #[source] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Unknown task type in routing rules: {0}")]
    UnknownTaskType(String),

    #[error("Routing rule '{rule}' references unknown backend: {backend}")]
    UnknownBackend { rule: String, backend: String },

    #[error("Invalid base_url for backend '{backend}': {reason}")]
    InvalidBaseUrl { backend: String, reason: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
