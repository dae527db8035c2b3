//! Inbound payloads of a persistent session.
//!
//! Clients either send the message as plain text or as a structured record:
//!
//! ```json
//! {"text": "describe this", "attachment": {"name": "a.png", "mimeType": "image/png", "size": 1024}}
//! ```

use serde::Deserialize;

use crate::domain::chat::ChatRequest;
use crate::error::TransportError;

/// Metadata describing a file the client attached to its message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PayloadRecord {
    text: String,
    #[serde(default)]
    attachment: Option<AttachmentMeta>,
}

/// A parsed client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientPayload {
    pub text: String,
    pub attachment: Option<AttachmentMeta>,
}

impl ClientPayload {
    /// Parse a text frame.
    ///
    /// Frames that decode as a record are taken apart; anything else,
    /// including text that merely starts with a brace, is the message text
    /// verbatim.
    pub fn parse(raw: &str) -> Result<Self, TransportError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(TransportError::Malformed(
                "Message must not be empty".to_string(),
            ));
        }

        if trimmed.starts_with('{')
            && let Ok(record) = serde_json::from_str::<PayloadRecord>(trimmed)
        {
            if record.text.trim().is_empty() {
                return Err(TransportError::Malformed(
                    "Message text must not be empty".to_string(),
                ));
            }
            return Ok(Self {
                text: record.text,
                attachment: record.attachment,
            });
        }

        Ok(Self {
            text: raw.to_string(),
            attachment: None,
        })
    }

    /// Turn the payload into a single-message request.
    pub fn into_request(self) -> Result<ChatRequest, TransportError> {
        ChatRequest::from_user_text(self.text)
    }
}
