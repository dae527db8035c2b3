//! Domain types for chat turns and their streamed output.

pub mod chat;
pub mod fragment;
pub mod payload;

pub use chat::{ChatMessage, ChatRequest, ChatRequestBody, MessageRole, WireMessage};
pub use fragment::{RelayEvent, StreamFragment};
pub use payload::{AttachmentMeta, ClientPayload};
