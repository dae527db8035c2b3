//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces the relay expects from its surroundings.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No HTTP, WebSocket, or provider wire types in any signature
//! - Upstream calls are producer tasks feeding a bounded channel
//! - Sinks frame events themselves; the relay never formats wire records

pub mod sink;
pub mod upstream;

pub use sink::FragmentSink;
pub use upstream::{FRAGMENT_CHANNEL_CAPACITY, FragmentStream, UpstreamPort, spawn_completion};
