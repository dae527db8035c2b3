#![doc = include_str!(concat!(env!("OUT_DIR"), "/README_GENERATED.md"))]
#![deny(unused_crate_dependencies)]

mod client;
mod config;
mod sse;

pub use client::OpenAiUpstream;
pub use config::{ProviderFlavor, UpstreamConfig};

// Used by integration tests only
#[cfg(test)]
use axum as _;
