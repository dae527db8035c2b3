#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

pub mod domain;
pub mod error;
pub mod ports;
pub mod services;
pub mod settings;

// Re-export commonly used types for convenience
pub use domain::{
    AttachmentMeta, ChatMessage, ChatRequest, ChatRequestBody, ClientPayload, MessageRole,
    RelayEvent, StreamFragment, WireMessage,
};
pub use error::{ConfigError, RelayError, TransportError, UpstreamError};
pub use ports::{
    FRAGMENT_CHANNEL_CAPACITY, FragmentSink, FragmentStream, UpstreamPort, spawn_completion,
};
pub use services::{
    AdmissionPermit, HealthSnapshot, HealthStatus, RateLimiter, StreamRelay, TurnOutcome,
};
pub use settings::{
    DEFAULT_RATE_LIMIT, DEFAULT_TIME_WINDOW_SECS, RateLimitSettings, RelaySettings,
};
