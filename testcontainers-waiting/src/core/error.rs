use std::{error::Error, io, time::Duration};

use crate::core::wait::{StrategyKind, WaitAllMode};

pub type Result<T> = std::result::Result<T, WaitError>;

/// Enum to represent the ways waiting for a container to become ready can fail.
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
    /// The strategy was misconfigured. Never retried.
    #[error("invalid wait strategy configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    /// The readiness condition was not met before the startup timeout elapsed.
    #[error("{kind} wait strategy timed out after {elapsed:?}: {detail}")]
    Timeout {
        kind: StrategyKind,
        elapsed: Duration,
        detail: String,
        #[source]
        source: Option<Box<WaitError>>,
    },
    /// The container cannot answer the question the strategy asks (e.g. no healthcheck declared).
    #[error("container '{id}' does not support {operation}")]
    TargetUnsupported { id: String, operation: String },
    /// The target failed in a way that is not worth retrying.
    #[error(transparent)]
    Target(TargetError),
}

/// Error type for a strategy which cannot run with the configuration it was given.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigurationError {
    #[error("log message pattern must be set before waiting")]
    MissingPattern,
    #[error("invalid log message pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error("shell command must be set before waiting")]
    MissingCommand,
    #[error("changing startup timeout is not supported with mode {0}")]
    TimeoutNotSupported(WaitAllMode),
    #[error("read timeout must be at least 1 millisecond, got {0:?}")]
    ReadTimeoutTooShort(Duration),
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Error type reported by a [`crate::WaitTarget`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    /// Represents an error when a container does not expose a specified port
    #[error("container '{id}' does not expose port {port}")]
    PortNotMapped { id: String, port: u16 },
    /// The container does not support the requested operation.
    #[error("container '{id}' does not support {operation}")]
    NotSupported { id: String, operation: String },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Represents any other error that does not fit into the above categories
    #[error("other error: {0}")]
    Other(Box<dyn Error + Sync + Send>),
}

impl WaitError {
    pub(crate) fn timeout(
        kind: StrategyKind,
        elapsed: Duration,
        detail: impl Into<String>,
    ) -> Self {
        Self::Timeout {
            kind,
            elapsed,
            detail: detail.into(),
            source: None,
        }
    }

    /// Returns `true` if the readiness condition was not met in time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<TargetError> for WaitError {
    fn from(error: TargetError) -> Self {
        match error {
            TargetError::NotSupported { id, operation } => {
                Self::TargetUnsupported { id, operation }
            }
            other => Self::Target(other),
        }
    }
}

impl TargetError {
    /// Creates a new `TargetError` from an arbitrary error payload.
    ///
    /// Useful for [`crate::WaitTarget`] implementations that need to report errors of their
    /// underlying container runtime client.
    pub fn other<E>(error: E) -> Self
    where
        E: Into<Box<dyn Error + Send + Sync>>,
    {
        Self::Other(error.into())
    }

    pub fn not_supported(id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::NotSupported {
            id: id.into(),
            operation: operation.into(),
        }
    }

    /// Returns `true` for errors that no amount of retrying can fix.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported { .. })
    }
}
