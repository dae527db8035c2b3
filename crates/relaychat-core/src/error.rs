//! Error taxonomy for the relay.
//!
//! Adapters map these to their own surfaces: HTTP status codes, terminal
//! error events on a stream, or process exit codes.

use thiserror::Error;

/// Problems on the client side of a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The client sent something that is not a valid request.
    #[error("{0}")]
    Malformed(String),

    /// The client went away.
    #[error("Client disconnected")]
    Closed,

    /// Writing to the client failed.
    #[error("Failed to write to client: {0}")]
    Write(String),
}

/// Failures of the upstream completion call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// The request could not be sent.
    #[error("Failed to reach model service: {0}")]
    Request(String),

    /// The provider answered with a non-success status.
    #[error("Model service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The provider reported an error inside the stream.
    #[error("Model service error: {0}")]
    Provider(String),

    /// The response stream broke off.
    #[error("Model stream interrupted: {0}")]
    Stream(String),

    /// No response within the allowed time.
    #[error("Model service timed out: {0}")]
    Timeout(String),
}

impl UpstreamError {
    /// Returns true if the client may reasonably retry the same turn.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Request(_) | Self::Stream(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Provider(_) => false,
        }
    }
}

/// Invalid or missing startup configuration. Fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// A failed chat turn, as seen by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Upstream(UpstreamError),

    /// Admission or an upstream wait exceeded its bound.
    #[error("Timed out during {stage}: {detail}")]
    Timeout { stage: &'static str, detail: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The service stopped admitting new turns.
    #[error("Service is shutting down")]
    ShuttingDown,
}

impl From<UpstreamError> for RelayError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Timeout(detail) => Self::Timeout {
                stage: "upstream",
                detail,
            },
            other => Self::Upstream(other),
        }
    }
}

impl RelayError {
    /// Text sent to the client in a terminal error event.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(e) => e.to_string(),
            Self::Upstream(e) => e.to_string(),
            Self::Timeout { stage, .. } => {
                format!("The request timed out during {stage}. Please try again.")
            }
            Self::Config(_) => "The service is misconfigured".to_string(),
            Self::ShuttingDown => {
                "The service is shutting down. Please try again later.".to_string()
            }
        }
    }

    /// Returns true if the client may retry the turn.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::ShuttingDown => true,
            Self::Upstream(e) => e.is_retryable(),
            Self::Transport(_) | Self::Config(_) => false,
        }
    }
}
