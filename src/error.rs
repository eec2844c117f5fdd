//! Error types shared by every driver and the store facade.
//!
//! Drivers translate their backend's native failures into [`Error`] so
//! callers see one taxonomy regardless of which backend was selected.
//! Errors are `Clone` because a store that failed driver selection hands
//! the same error to every later operation.

use std::fmt;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad class of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The backend refused the write because it is out of space.
    QuotaExceeded,
    /// A transaction could not be started, committed or was rolled back.
    TransactionAborted,
    /// Another connection or process holds the backend.
    ConnectionBlocked,
    /// Filesystem failure underneath the backend.
    Io,
    /// Anything the driver could not classify.
    Other,
}

impl fmt::Display for BackendErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::QuotaExceeded => "quota exceeded",
            Self::TransactionAborted => "transaction aborted",
            Self::ConnectionBlocked => "connection blocked",
            Self::Io => "I/O error",
            Self::Other => "backend error",
        };
        f.write_str(s)
    }
}

/// Storage errors with structured context.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An explicitly requested driver is unknown or failed its probe.
    #[error("requested driver unavailable: {}", .requested.join(", "))]
    DriverUnavailable { requested: Vec<String> },

    /// No driver, including the fallback, is usable in this environment.
    #[error("no storage driver available (tried: {})", .tried.join(", "))]
    NoDriverAvailable { tried: Vec<String> },

    /// A value or key cannot be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Native backend failure.
    #[error("{driver}: {kind}: {message}")]
    Backend {
        driver: &'static str,
        kind: BackendErrorKind,
        message: String,
    },

    /// Absence reported as an error by callers that require a value.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid or late configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// User code run by an operation (an `iterate` visitor) panicked.
    #[error("operation panicked: {0}")]
    Panicked(String),

    /// The store worker has shut down.
    #[error("store is closed")]
    Closed,
}

impl Error {
    /// Create a backend error.
    pub fn backend(driver: &'static str, kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self::Backend {
            driver,
            kind,
            message: message.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Returns the backend error kind, if this is a backend error.
    #[must_use]
    pub fn backend_kind(&self) -> Option<BackendErrorKind> {
        match self {
            Self::Backend { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether this error comes from driver selection and is therefore
    /// permanent for the store that produced it.
    #[must_use]
    pub fn is_selection_failure(&self) -> bool {
        matches!(
            self,
            Self::DriverUnavailable { .. } | Self::NoDriverAvailable { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::backend("runtime", BackendErrorKind::Other, format!("blocking task failed: {err}"))
    }
}
