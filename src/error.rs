//! Error types for apgate
//!
//! Authorization rejections (400/403/404) are *outcomes* of the read
//! pipeline, not errors; see [`crate::federation::ReadOutcome`]. Everything
//! in this enum is either a collaborator failure or a response-construction
//! failure. The HTTP layer answers these with [`AppError::status_code`] and
//! no body.

use axum::http::StatusCode;
use thiserror::Error;

/// Application-wide error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Access denied (403)
    #[error("Access denied")]
    Forbidden,

    /// Validation error (400)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Object storage failure (500)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Authorization policy adapter failed (500)
    #[error("Authorization policy error: {0}")]
    Policy(String),

    /// Signature key material could not be resolved or decoded (502)
    #[error("Key resolution error: {0}")]
    KeyResolution(String),

    /// A collaborator did not answer in time (504)
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// Object could not be serialized (500)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Fewer bytes reached the client than the payload holds (500)
    #[error("Short write: wrote {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    /// I/O error while writing a payload (500)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl AppError {
    /// HTTP status this error surfaces as.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::KeyResolution(_) => StatusCode::BAD_GATEWAY,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Storage(_)
            | AppError::Policy(_)
            | AppError::Serialization(_)
            | AppError::ShortWrite { .. }
            | AppError::Io(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for the error metric.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::Forbidden => "forbidden",
            AppError::Validation(_) => "validation",
            AppError::Storage(_) => "storage",
            AppError::Policy(_) => "policy",
            AppError::KeyResolution(_) => "key_resolution",
            AppError::Timeout(_) => "timeout",
            AppError::Serialization(_) => "serialization",
            AppError::ShortWrite { .. } => "short_write",
            AppError::Io(_) => "io",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collaborator_failures_are_server_side() {
        assert_eq!(
            AppError::Policy("boom".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::KeyResolution("gone".to_string()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Timeout("object store").status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn short_write_reports_byte_counts() {
        let error = AppError::ShortWrite {
            written: 3,
            expected: 10,
        };
        assert_eq!(error.to_string(), "Short write: wrote 3 of 10 bytes");
        assert_eq!(error.kind(), "short_write");
    }
}
