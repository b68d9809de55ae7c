//! The `/ws/agent` upgrade handler (spec §4.3, §6): one long-lived
//! connection per agent. A write task owns the socket's send half and
//! drains an `mpsc::UnboundedSender<Message>` so the dispatcher's
//! [`AgentHandle`](crate::dispatcher::AgentHandle) never touches the raw
//! socket; a read loop decodes inbound [`HubEnvelope`] frames and drives
//! registration, heartbeats, and probe responses.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::dispatcher::{HubEnvelope, ProbeOutcome, ProbeResult};
use crate::domain::agent::LoadedPack;
use crate::ids::{AgentId, DispatchRequestId};
use crate::state::HubRuntime;

/// Unique identifier for a raw WebSocket connection, independent of the
/// agent identity it may or may not have registered yet.
#[derive(Clone, Copy, Eq)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({})", self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq for ConnectionId {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Hash for ConnectionId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Send-capability view of one raw connection before (or absent)
/// registration, kept only long enough to install the dispatcher handle.
#[derive(Debug)]
pub struct WebSocketConnection {
    pub id: ConnectionId,
    pub sender: mpsc::UnboundedSender<Message>,
}

impl WebSocketConnection {
    #[must_use]
    pub fn new(sender: mpsc::UnboundedSender<Message>) -> Self {
        Self { id: ConnectionId::new(), sender }
    }
}

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    name: String,
    os: String,
    #[serde(rename = "agentVersion")]
    agent_version: String,
    #[serde(default)]
    packs: Vec<LoadedPack>,
}

#[derive(Debug, Deserialize)]
struct HeartbeatPayload {
    #[serde(rename = "agentId")]
    agent_id: String,
}

#[derive(Debug, Deserialize)]
struct ProbeResponsePayload {
    outcome: String,
    #[serde(default)]
    data: serde_json::Value,
    #[serde(rename = "durationMs", default)]
    duration_ms: u64,
}

/// `GET /ws/agent`: upgrades the HTTP connection and hands the socket to
/// [`handle_socket`].
pub async fn upgrade(State(runtime): State<Arc<HubRuntime>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, runtime))
}

/// Drives one agent connection end to end: write task, registration, and
/// the read loop that feeds heartbeats/probe responses back into
/// [`HubRuntime`]'s dispatcher halves.
pub async fn handle_socket(socket: WebSocket, runtime: Arc<HubRuntime>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let write_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut agent_id: Option<AgentId> = None;

    while let Some(Ok(message)) = stream.next().await {
        let Message::Text(text) = message else { continue };
        let envelope: HubEnvelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::warn!(error = %err, "discarding malformed agent frame");
                continue;
            }
        };
        if !envelope.verify(&runtime.config.secret) {
            tracing::warn!(kind = %envelope.kind, "discarding agent frame with invalid signature");
            continue;
        }

        match envelope.kind.as_str() {
            "agent.register" => {
                let payload: RegisterPayload = match serde_json::from_value(envelope.payload.clone()) {
                    Ok(payload) => payload,
                    Err(err) => {
                        tracing::warn!(error = %err, "rejecting malformed agent.register");
                        let _ = tx.send(HubEnvelope::error(&err.to_string(), &runtime.config.secret).to_json_message().unwrap());
                        continue;
                    }
                };
                match runtime
                    .registry
                    .register(payload.name, payload.os, payload.agent_version, payload.packs, tx.clone())
                    .await
                {
                    Ok(agent) => {
                        agent_id = Some(agent.id.clone());
                        let ack = HubEnvelope::ack(&agent.id, &runtime.config.secret);
                        if let Ok(message) = ack.to_json_message() {
                            let _ = tx.send(message);
                        }
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "agent registration failed");
                        let _ = tx.send(HubEnvelope::error(&err.to_string(), &runtime.config.secret).to_json_message().unwrap());
                    }
                }
            }
            "agent.heartbeat" => {
                let Some(id) = agent_id.clone() else {
                    tracing::warn!("heartbeat received before registration; dropping");
                    continue;
                };
                if let Ok(payload) = serde_json::from_value::<HeartbeatPayload>(envelope.payload.clone()) {
                    if payload.agent_id != id.to_string() {
                        tracing::warn!("heartbeat agentId does not match this connection; dropping");
                        continue;
                    }
                }
                if let Err(err) = runtime.registry.heartbeat(&id).await {
                    tracing::error!(error = %err, "failed to record heartbeat");
                }
            }
            "agent.probe.response" => {
                let Ok(request_id) = envelope.id.parse::<DispatchRequestId>() else {
                    tracing::warn!(id = %envelope.id, "probe response carries an unparseable request id");
                    continue;
                };
                let payload: ProbeResponsePayload = match serde_json::from_value(envelope.payload.clone()) {
                    Ok(payload) => payload,
                    Err(err) => {
                        tracing::warn!(error = %err, "malformed agent.probe.response");
                        continue;
                    }
                };
                let outcome = if payload.outcome == "ok" { ProbeOutcome::Ok } else { ProbeOutcome::Error };
                runtime.waiters.resolve(
                    &request_id,
                    ProbeResult {
                        outcome,
                        data: payload.data,
                        duration_ms: payload.duration_ms,
                    },
                );
            }
            other => {
                tracing::warn!(kind = other, "ignoring unknown agent frame type");
            }
        }
    }

    if let Some(id) = agent_id {
        if let Err(err) = runtime.registry.disconnect(&id).await {
            tracing::error!(error = %err, "failed to mark agent offline on disconnect");
        }
    }

    write_task.abort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_uniqueness() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_connection_id_display() {
        let id = ConnectionId::new();
        let display = format!("{}", id);
        assert!(!display.is_empty());
    }
}
