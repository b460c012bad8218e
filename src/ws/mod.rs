//! WebSocket client library
//!
//! Provides a reusable WebSocket client with automatic reconnection,
//! handshake replay, ping/pong handling, and configurable backoff.

mod client;
mod types;

pub use client::{WsClient, WsConnection};
pub use types::{WsConfig, WsError, WsMessage};
