//! HTTP request handlers for the Axum web server.
//!
//! Handlers are thin: they parse, pick a sink for their protocol, and hand
//! the turn to the shared `StreamRelay`.

pub mod chat;
pub mod health;
pub mod ws;
