//! Send-capability handle onto one agent's WebSocket (spec §4.3).
//!
//! Mirrors `websocket::handler::WebSocketConnection`: the dispatcher never
//! holds the raw socket, only an `mpsc::UnboundedSender` feeding the
//! connection's write task. Cloning a handle is cheap and shares the same
//! channel, so a registry lookup never needs to hold a lock across an
//! `.await`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use axum::extract::ws::Message;
use tokio::sync::mpsc;

use crate::domain::agent::AgentStatus;
use crate::ids::AgentId;

use super::envelope::HubMessage;

fn status_to_u8(status: AgentStatus) -> u8 {
    match status {
        AgentStatus::Online => 0,
        AgentStatus::Degraded => 1,
        AgentStatus::Offline => 2,
    }
}

fn u8_to_status(v: u8) -> AgentStatus {
    match v {
        0 => AgentStatus::Online,
        1 => AgentStatus::Degraded,
        _ => AgentStatus::Offline,
    }
}

/// A cloneable, lock-free view onto one agent's live connection.
#[derive(Clone)]
pub struct AgentHandle {
    agent_id: AgentId,
    sender: mpsc::UnboundedSender<Message>,
    status: Arc<AtomicU8>,
}

impl AgentHandle {
    pub fn new(agent_id: AgentId, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            agent_id,
            sender,
            status: Arc::new(AtomicU8::new(status_to_u8(AgentStatus::Online))),
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn status(&self) -> AgentStatus {
        u8_to_status(self.status.load(Ordering::Relaxed))
    }

    pub fn set_status(&self, status: AgentStatus) {
        self.status.store(status_to_u8(status), Ordering::Relaxed);
    }

    pub fn is_online(&self) -> bool {
        self.status() != AgentStatus::Offline
    }

    /// Sends a message on the underlying channel. Fails only once the
    /// connection's write task (and thus the receiving half) has gone
    /// away.
    pub async fn send(&self, message: HubMessage) -> Result<(), String> {
        let ws_message = match message {
            HubMessage::Envelope(envelope) => envelope
                .to_json_message()
                .map_err(|e| format!("failed to encode envelope: {e}"))?,
            HubMessage::Raw(message) => message,
        };
        self.sender
            .send(ws_message)
            .map_err(|_| "agent connection closed".to_string())
    }
}
