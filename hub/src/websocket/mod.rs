//! WebSocket support for agent connections
//!
//! Agents and the dashboard connect over a single long-lived WebSocket that
//! upgrades from HTTP on the same port as the REST API. Each connection is
//! tracked by [`ConnectionId`] in the dispatcher's registry; there is no
//! room/channel abstraction — every message is either hub-to-one-agent or
//! agent-to-hub.

mod config;
mod handler;

pub use config::WebSocketConfig;
pub use handler::{handle_socket, upgrade, ConnectionId, WebSocketConnection};

// Re-export axum WebSocket types for convenience
pub use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
