use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] relay_config::ConfigError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Backend '{backend}' failed: {message}")]
    Adapter {
        backend: String,
        message: String,
        retryable: bool,
    },

    #[error("Service '{backend}' is unavailable: {reason}")]
    ServiceUnavailable { backend: String, reason: String },

    #[error("Execution on '{backend}' timed out after {seconds}s")]
    Timeout { backend: String, seconds: u64 },

    #[error("No service available to handle task type: {task_type}")]
    NoServiceAvailable { task_type: String },

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Generic backend-side failure, eligible for one more attempt.
    pub fn adapter(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Adapter {
            backend: backend.into(),
            message: message.into(),
            retryable: true,
        }
    }

    /// Semantic backend failure (authentication, payment, unknown model).
    /// Never retried.
    pub fn adapter_fatal(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Adapter {
            backend: backend.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn unavailable(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ServiceUnavailable {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(backend: impl Into<String>, seconds: u64) -> Self {
        Error::Timeout {
            backend: backend.into(),
            seconds,
        }
    }

    /// Whether the same candidate may be attempted again.
    ///
    /// Unavailability is handled separately: it is retryable against the
    /// *next* candidate, never the same one.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Adapter {
                retryable: true,
                ..
            } | Error::ServiceUnavailable { .. }
        )
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::ServiceUnavailable { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
