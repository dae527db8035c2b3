//! Wire framing of relay events for each client protocol.
//!
//! | Event | WebSocket frame | SSE record |
//! |---|---|---|
//! | `UserEcho` | `{"role":"user","content":…}` | none |
//! | `AssistantStart` | `{"role":"assistant","type":"start","content":""}` | none |
//! | `Stream` | `{"role":"assistant","type":"stream","content":…}` | `data: {"content":…}` |
//! | `Done` | none | `data: [DONE]` |
//! | `Error` | `{"role":"assistant","type":"error","content":…}` | `data: {"error":…}` |

use relaychat_core::RelayEvent;
use serde_json::json;

/// SSE terminal sentinel.
pub const SSE_DONE: &str = "data: [DONE]\n\n";

/// Text frame for the persistent session, if the event has one.
pub fn ws_frame(event: &RelayEvent) -> Option<String> {
    let frame = match event {
        RelayEvent::UserEcho { content } => json!({"role": "user", "content": content}),
        RelayEvent::AssistantStart => {
            json!({"role": "assistant", "type": "start", "content": ""})
        }
        RelayEvent::Stream { content } => {
            json!({"role": "assistant", "type": "stream", "content": content})
        }
        RelayEvent::Error { message } => {
            json!({"role": "assistant", "type": "error", "content": message})
        }
        RelayEvent::Done => return None,
    };
    Some(frame.to_string())
}

/// SSE record for the one-shot session, if the event has one.
pub fn sse_record(event: &RelayEvent) -> Option<String> {
    match event {
        RelayEvent::Stream { content } => Some(sse_data(&json!({"content": content}))),
        RelayEvent::Done => Some(SSE_DONE.to_string()),
        RelayEvent::Error { message } => Some(sse_error(message)),
        RelayEvent::UserEcho { .. } | RelayEvent::AssistantStart => None,
    }
}

/// `data: {"error": …}` record.
pub fn sse_error(message: &str) -> String {
    sse_data(&json!({"error": message}))
}

fn sse_data(value: &serde_json::Value) -> String {
    format!("data: {value}\n\n")
}
