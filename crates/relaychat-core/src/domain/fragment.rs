//! Streaming units: what the provider produces and what the relay emits.

use crate::error::UpstreamError;

/// One item of an upstream completion stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFragment {
    /// Incremental generated text. Never empty.
    Content(String),
    /// The provider signalled completion.
    Done,
    /// The call failed; nothing follows.
    Error(UpstreamError),
}

impl StreamFragment {
    /// True for `Done` and `Error`.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error(_))
    }
}

/// An event written by the relay to a client transport.
///
/// Transports decide how (and whether) each variant is framed on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Echo of the user's message.
    UserEcho { content: String },
    /// The assistant reply is about to start.
    AssistantStart,
    /// A piece of the assistant reply.
    Stream { content: String },
    /// The reply finished normally.
    Done,
    /// The turn failed; carries a message safe to show the user.
    Error { message: String },
}

impl RelayEvent {
    #[must_use]
    pub fn stream(content: impl Into<String>) -> Self {
        Self::Stream {
            content: content.into(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}
