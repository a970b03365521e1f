//! Error types for the EdgeMesh Control Plane

use std::io;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Result type alias for the control plane
pub type Result<T> = std::result::Result<T, Error>;

/// Control plane errors
///
/// Validation-stage failures map to deterministic HTTP statuses; policy-stage
/// failures are converted to deny decisions before they ever become an error,
/// so a policy denial surfaces here only as [`Error::Forbidden`].
#[derive(Error, Debug)]
pub enum Error {
    /// Referenced entity does not exist
    #[error("{0} not found")]
    NotFound(&'static str),

    /// State or policy disallows the request
    #[error("{0}")]
    Forbidden(String),

    /// Dependent data missing or stale; retryable after remediation
    #[error("{0}")]
    Unavailable(String),

    /// Duplicate unique key (e.g. double enrollment)
    #[error("{0}")]
    Conflict(String),

    /// Malformed request or invalid lifecycle transition
    #[error("{0}")]
    BadRequest(String),

    /// Credential rejected (e.g. invalid enrollment token)
    #[error("{0}")]
    Unauthorized(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Internal detail stays in logs, not on the wire
        let detail = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Internal error");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}
