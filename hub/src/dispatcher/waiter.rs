//! Request/response correlation table for in-flight probe dispatches
//! (spec §4.3).
//!
//! One `oneshot` channel per outstanding `hub.probe.request`, keyed by its
//! [`DispatchRequestId`]. `send_probe` installs a waiter before writing to
//! the socket and either the `agent.probe.response` handler resolves it or
//! the timeout future in `dispatcher::send_probe` removes it.

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::ids::DispatchRequestId;

/// Outcome reported by an agent for a dispatched probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Ok,
    Error,
}

/// The resolved result of an `agent.probe.response` (§4.3 / §4.5).
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub outcome: ProbeOutcome,
    pub data: Value,
    pub duration_ms: u64,
}

/// `DashMap<DispatchRequestId, oneshot::Sender<ProbeResult>>` per the
/// dispatcher's design note: each shard's lock is held only for the
/// duration of the map operation, never across the `.await` in
/// `dispatcher::send_probe`.
#[derive(Default)]
pub struct WaiterTable {
    waiters: DashMap<DispatchRequestId, oneshot::Sender<ProbeResult>>,
}

impl WaiterTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a waiter for `request_id`, returning the receiving half.
    pub fn install(&self, request_id: DispatchRequestId) -> oneshot::Receiver<ProbeResult> {
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(request_id, tx);
        rx
    }

    /// Resolves the waiter for `request_id` with `result`, if one is still
    /// installed (it may have already timed out and been forgotten).
    /// Returns `true` if a waiter was found and signalled.
    pub fn resolve(&self, request_id: &DispatchRequestId, result: ProbeResult) -> bool {
        match self.waiters.remove(request_id) {
            Some((_, tx)) => tx.send(result).is_ok(),
            None => false,
        }
    }

    /// Removes a waiter without resolving it, e.g. after a timeout.
    pub fn forget(&self, request_id: &DispatchRequestId) {
        self.waiters.remove(request_id);
    }

    pub fn pending_count(&self) -> usize {
        self.waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_delivers_result_to_installed_waiter() {
        let table = WaiterTable::new();
        let request_id = DispatchRequestId::new();
        let rx = table.install(request_id.clone());

        let resolved = table.resolve(
            &request_id,
            ProbeResult {
                outcome: ProbeOutcome::Ok,
                data: serde_json::json!({"cpu": 12}),
                duration_ms: 42,
            },
        );
        assert!(resolved);

        let result = rx.await.unwrap();
        assert_eq!(result.outcome, ProbeOutcome::Ok);
        assert_eq!(result.duration_ms, 42);
    }

    #[test]
    fn resolve_unknown_request_id_is_a_noop() {
        let table = WaiterTable::new();
        let resolved = table.resolve(
            &DispatchRequestId::new(),
            ProbeResult {
                outcome: ProbeOutcome::Ok,
                data: Value::Null,
                duration_ms: 0,
            },
        );
        assert!(!resolved);
    }

    #[test]
    fn forget_removes_pending_waiter() {
        let table = WaiterTable::new();
        let request_id = DispatchRequestId::new();
        let _rx = table.install(request_id.clone());
        assert_eq!(table.pending_count(), 1);
        table.forget(&request_id);
        assert_eq!(table.pending_count(), 0);
    }
}
