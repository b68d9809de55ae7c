//! Wire envelope for the `/ws/agent` transport (spec §6).
//!
//! Every frame on the wire is a single JSON object shaped like
//! `{id, type, timestamp, agentId?, signature, payload}`. Agent-to-hub
//! frame types are `agent.register` / `agent.heartbeat` /
//! `agent.probe.response`; hub-to-agent are `hub.ack` / `hub.probe.request`
//! / `hub.error`. `HubMessage` is the dispatcher's internal send type —
//! either a structured envelope to serialize, or a raw `Message` (e.g. a
//! ping frame) to forward as-is.

use std::time::Duration;

use axum::extract::ws::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::DispatchRequestId;

/// A decoded frame sent by the hub to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubEnvelope {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Base64 MAC over `id`/`type`/`timestamp`/`agentId`/`payload`, keyed
    /// by `SONDE_SECRET` (`crypto::sign_envelope`). Agents verify it
    /// before acting on a frame; the hub verifies inbound frames the same
    /// way.
    pub signature: String,
    pub payload: Value,
}

/// The fields a signature covers, serialized identically on both ends.
#[derive(Serialize)]
struct SignedFields<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
    timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    agent_id: &'a Option<String>,
    payload: &'a Value,
}

fn canonical_bytes(id: &str, kind: &str, timestamp: DateTime<Utc>, agent_id: &Option<String>, payload: &Value) -> Vec<u8> {
    serde_json::to_vec(&SignedFields { id, kind, timestamp, agent_id, payload })
        .expect("envelope fields always serialize")
}

impl HubEnvelope {
    fn build(id: String, kind: &str, agent_id: Option<String>, payload: Value, secret: &str) -> Self {
        let timestamp = Utc::now();
        let canonical = canonical_bytes(&id, kind, timestamp, &agent_id, &payload);
        let signature = crate::crypto::sign_envelope(&canonical, secret);
        Self {
            id,
            kind: kind.to_string(),
            timestamp,
            agent_id,
            signature,
            payload,
        }
    }

    pub fn ack(agent_id: &crate::ids::AgentId, secret: &str) -> Self {
        Self::build(
            crate::ids::RequestId::new().to_string(),
            "hub.ack",
            Some(agent_id.to_string()),
            serde_json::json!({}),
            secret,
        )
    }

    pub fn probe_request(
        request_id: DispatchRequestId,
        probe: String,
        params: Value,
        timeout: Duration,
        secret: &str,
    ) -> Self {
        Self::build(
            request_id.to_string(),
            "hub.probe.request",
            None,
            serde_json::json!({
                "probe": probe,
                "params": params,
                "timeoutMs": timeout.as_millis() as u64,
            }),
            secret,
        )
    }

    pub fn error(message: &str, secret: &str) -> Self {
        Self::build(
            crate::ids::RequestId::new().to_string(),
            "hub.error",
            None,
            serde_json::json!({ "message": message }),
            secret,
        )
    }

    /// Verifies this envelope's signature against `secret`. Used on
    /// inbound agent frames before the dispatcher acts on them.
    pub fn verify(&self, secret: &str) -> bool {
        let canonical = canonical_bytes(&self.id, &self.kind, self.timestamp, &self.agent_id, &self.payload);
        crate::crypto::verify_envelope(&canonical, &self.signature, secret)
    }

    pub fn to_json_message(&self) -> Result<Message, serde_json::Error> {
        let text = serde_json::to_string(self)?;
        Ok(Message::Text(text.into()))
    }
}

/// Something the dispatcher can hand to an agent's send channel.
#[derive(Debug)]
pub enum HubMessage {
    Envelope(HubEnvelope),
    Raw(Message),
}
