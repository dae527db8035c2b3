//! Request-level HTTP errors.
//!
//! Failures inside a running turn never reach this type; they are written to
//! the stream as error events. `HttpError` covers requests that are refused
//! before a turn starts.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Axum-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    /// No such route.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The server is draining and accepts no new sessions.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = ErrorBody {
            error: message,
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}
