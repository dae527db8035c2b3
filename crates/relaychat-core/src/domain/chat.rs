//! Chat domain types.
//!
//! These types describe one chat turn as it travels from a client to the
//! model provider, independent of any transport or provider wire format.

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    /// Parse a role from a string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Self::System),
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }

    /// Convert role to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single message of a conversation.
///
/// Fields are private so a message cannot change once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    role: MessageRole,
    content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(MessageRole::System, content)
    }

    #[must_use]
    pub const fn role(&self) -> MessageRole {
        self.role
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }
}

/// An ordered, non-empty list of messages for one chat turn.
///
/// Owned by the relay invocation that receives it and dropped once the
/// response has finished streaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChatRequest {
    messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// Build a request, rejecting an empty list or a blank latest user turn.
    ///
    /// History entries (system prompts, earlier turns) are forwarded as-is,
    /// even when their content is empty.
    pub fn new(messages: Vec<ChatMessage>) -> Result<Self, TransportError> {
        if messages.is_empty() {
            return Err(TransportError::Malformed(
                "Request must contain at least one message".to_string(),
            ));
        }

        let request = Self { messages };
        if request.last_user_content().trim().is_empty() {
            return Err(TransportError::Malformed(
                "Latest user message has empty content".to_string(),
            ));
        }

        Ok(request)
    }

    /// Single-message request, the shape a persistent session sends per turn.
    pub fn from_user_text(text: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(vec![ChatMessage::user(text)])
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always false; kept for the `len`/`is_empty` pair.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Content of the most recent user message, or of the last message when
    /// the conversation contains no user turn.
    #[must_use]
    pub fn last_user_content(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .or_else(|| self.messages.last())
            .map_or("", |m| m.content.as_str())
    }
}

/// Wire shape of a message inside a one-shot request body.
///
/// Roles arrive as free text and are checked when converting to
/// [`ChatMessage`].
#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

/// One-shot request body: `{"messages": [{"role", "content"}, ...]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequestBody {
    pub messages: Vec<WireMessage>,
}

impl TryFrom<ChatRequestBody> for ChatRequest {
    type Error = TransportError;

    fn try_from(body: ChatRequestBody) -> Result<Self, Self::Error> {
        let messages = body
            .messages
            .into_iter()
            .map(|m| {
                MessageRole::parse(&m.role)
                    .map(|role| ChatMessage::new(role, m.content))
                    .ok_or_else(|| {
                        TransportError::Malformed(format!("Invalid message role: {}", m.role))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(messages)
    }
}
