//! Error types for bizclass.
//!
//! Library crates use [`BizclassError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Stage-local problems (a failed page, a failed strategy, a slow ML call)
//! are *not* errors: they are recorded as degradations on the result. Only
//! the variants below ever abort a request.

use std::path::PathBuf;

/// Top-level error type for all bizclass operations.
#[derive(Debug, thiserror::Error)]
pub enum BizclassError {
    /// The request carried neither a business name nor a usable website.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// The caller cancelled the request before the engine could finish.
    #[error("deadline exceeded after {elapsed_ms}ms")]
    DeadlineExceeded { elapsed_ms: u128 },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during acquisition or an outbound service call.
    #[error("network error: {0}")]
    Network(String),

    /// HTML or reference-data parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// ML classifier error (transport, status, or response decoding).
    #[error("ml classifier error: {0}")]
    Ml(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (unknown code, bad weight, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BizclassError>;

impl BizclassError {
    /// Create an invalid-request error from any displayable message.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
