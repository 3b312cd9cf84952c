//! HTTP response bodies.

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::error::ConsoleError;
use crate::session::SessionInfo;

/// Error body returned by every HTTP endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Machine-readable code, e.g. `SESSION_NOT_FOUND`.
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn session_not_found(id: &str) -> Self {
        Self::new("SESSION_NOT_FOUND", format!("Session '{id}' not found"))
    }

    pub fn capacity_exceeded(message: impl Into<String>) -> Self {
        Self::new("CAPACITY_EXCEEDED", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }
}

/// Rejection used by handlers.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

impl From<&ConsoleError> for ErrorResponse {
    fn from(err: &ConsoleError) -> Self {
        match err {
            ConsoleError::SessionNotFound(id) => Self::session_not_found(id),
            ConsoleError::CapacityExceeded(message) => Self::capacity_exceeded(message.clone()),
            ConsoleError::Protocol(message) => Self::bad_request(message.clone()),
            other => Self::internal_error(other.to_string()),
        }
    }
}

/// Status and body for a session-tier error.
pub fn api_error(err: &ConsoleError) -> ApiError {
    let status = match err {
        ConsoleError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        ConsoleError::CapacityExceeded(_) => StatusCode::SERVICE_UNAVAILABLE,
        ConsoleError::Protocol(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse::from(err)))
}

/// Body of `GET /api/v1/sessions`.
#[derive(Debug, Clone, Serialize)]
pub struct ListSessionsResponse {
    pub count: usize,
    pub sessions: Vec<SessionInfo>,
}
