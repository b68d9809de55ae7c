//! Agent dispatcher (spec §4.3): WebSocket registry, request/response
//! correlation, and liveness tracking for connected agents.
//!
//! Two `DashMap`s carry all the state: [`AgentRegistry`] maps an
//! [`AgentId`] to a send-capability handle on its WebSocket, and
//! [`WaiterTable`] maps an in-flight [`DispatchRequestId`] to the
//! `oneshot` sender a probe call is blocked on. Neither ever hands out the
//! raw socket — only a sender — matching
//! `websocket::handler::WebSocketConnection`'s send-capability design.

mod envelope;
mod handle;
mod registry;
mod waiter;

pub use envelope::{HubEnvelope, HubMessage};
pub use handle::AgentHandle;
pub use registry::AgentRegistry;
pub use waiter::{ProbeOutcome, ProbeResult, WaiterTable};

use std::time::Duration;

use crate::domain::pack::CapabilityLevel;
use crate::error::{Error, Result};
use crate::ids::{AgentId, DispatchRequestId};

/// Default per-probe timeout when a pack doesn't declare one (§4.3).
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves `agent_name_or_id`, rejects if offline, mints a request id,
/// installs a waiter, sends `hub.probe.request`, and awaits the response up
/// to `timeout` (§4.3 "Probe dispatch"). This is the dispatcher's half of
/// `router::execute` for agent-targeted probes.
pub async fn send_probe(
    registry: &AgentRegistry,
    waiters: &WaiterTable,
    agent_name_or_id: &str,
    probe: &str,
    params: serde_json::Value,
    timeout: Option<Duration>,
    secret: &str,
) -> Result<ProbeResult> {
    let handle = registry
        .resolve(agent_name_or_id)
        .ok_or_else(|| Error::AgentUnavailable {
            agent: agent_name_or_id.to_string(),
            state: "unknown".to_string(),
        })?;

    if !handle.is_online() {
        return Err(Error::AgentUnavailable {
            agent: agent_name_or_id.to_string(),
            state: handle.status().to_string(),
        });
    }

    let timeout = timeout.unwrap_or(DEFAULT_PROBE_TIMEOUT);
    let request_id = DispatchRequestId::new();
    let rx = waiters.install(request_id.clone());

    let envelope = HubEnvelope::probe_request(request_id.clone(), probe.to_string(), params, timeout, secret);
    if let Err(err) = handle.send(HubMessage::Envelope(envelope)).await {
        waiters.forget(&request_id);
        return Err(Error::Transport(err.to_string()));
    }

    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(_)) => {
            // Sender dropped without resolving (e.g. registry sweep during disconnect).
            Err(Error::Transport("agent connection closed mid-probe".to_string()))
        }
        Err(_) => {
            waiters.forget(&request_id);
            Err(Error::Timeout(timeout))
        }
    }
}

/// Used by `policy::evaluate_probe_access` callers that need to know the
/// capability level a dispatched probe declared, if any pack on the agent
/// advertises it. Dispatcher-targeted probes don't always carry a known
/// capability (unregistered packs), hence `Option`. The agent id is
/// currently unused since the catalog is global rather than per-agent, but
/// is kept in the signature for when per-agent pack versions matter.
pub fn probe_capability(
    catalog: &crate::packs::PackCatalog,
    _agent_id: &AgentId,
    probe: &str,
) -> Option<CapabilityLevel> {
    catalog.capability_of(probe)
}
