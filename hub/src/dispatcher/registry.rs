//! Registry of connected agents (spec §4.3).
//!
//! `DashMap<AgentId, AgentHandle>` is the live-connection half of agent
//! state; `PersistencePort` owns the durable [`Agent`] record (name, packs,
//! status, last-seen). Registration rebinds an existing record by name
//! rather than minting a new id, matching `Agent::rebind`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::domain::agent::{Agent, AgentStatus, LoadedPack};
use crate::error::Result;
use crate::ids::AgentId;
use crate::persistence::PersistencePort;

use super::handle::AgentHandle;

/// Connection-table half of agent state, plus a name index so
/// `send_probe("web-01", ...)` can resolve a human name to a live handle.
pub struct AgentRegistry {
    persistence: Arc<dyn PersistencePort>,
    handles: DashMap<AgentId, AgentHandle>,
    names: DashMap<String, AgentId>,
}

impl AgentRegistry {
    pub fn new(persistence: Arc<dyn PersistencePort>) -> Self {
        Self {
            persistence,
            handles: DashMap::new(),
            names: DashMap::new(),
        }
    }

    /// Handles an incoming `agent.register`: rebinds an existing record by
    /// name if one exists, otherwise creates a new one, and installs a live
    /// handle over `sender` (§4.3 "Registration protocol").
    pub async fn register(
        &self,
        name: String,
        os: String,
        agent_version: String,
        packs: Vec<LoadedPack>,
        sender: mpsc::UnboundedSender<axum::extract::ws::Message>,
    ) -> Result<Agent> {
        let agent = match self.persistence.get_agent_by_name(&name).await? {
            Some(mut existing) => {
                existing.rebind(os, agent_version, packs);
                existing
            }
            None => Agent::new(name.clone(), os, agent_version, packs),
        };

        self.persistence.put_agent(agent.clone()).await?;

        let handle = AgentHandle::new(agent.id.clone(), sender);
        self.handles.insert(agent.id.clone(), handle);
        self.names.insert(name, agent.id.clone());

        Ok(agent)
    }

    /// Resolves a name or a stringified `AgentId` to a live handle.
    pub fn resolve(&self, name_or_id: &str) -> Option<AgentHandle> {
        if let Some(id) = self.names.get(name_or_id) {
            return self.handles.get(id.value()).map(|h| h.clone());
        }
        if let Ok(id) = name_or_id.parse::<AgentId>() {
            return self.handles.get(&id).map(|h| h.clone());
        }
        None
    }

    pub fn handle_for(&self, id: &AgentId) -> Option<AgentHandle> {
        self.handles.get(id).map(|h| h.clone())
    }

    /// Fetches the durable record behind a live handle's id, e.g. to read
    /// `agent_version` for response metadata without holding persistence
    /// directly in every caller.
    pub async fn agent_record(&self, id: &AgentId) -> Result<Option<Agent>> {
        self.persistence.get_agent(id).await
    }

    /// Applies an `agent.heartbeat`: clears `Degraded` back to `Online`
    /// and bumps `last_seen`.
    pub async fn heartbeat(&self, id: &AgentId) -> Result<()> {
        if let Some(mut agent) = self.persistence.get_agent(id).await? {
            agent.touch_heartbeat();
            self.persistence.put_agent(agent).await?;
        }
        if let Some(handle) = self.handles.get(id) {
            handle.set_status(AgentStatus::Online);
        }
        Ok(())
    }

    /// Marks an agent `offline` and drops its live handle, e.g. on socket
    /// close. The durable record survives so history (last known packs,
    /// last_seen) is still queryable.
    pub async fn disconnect(&self, id: &AgentId) -> Result<()> {
        if let Some((_, handle)) = self.handles.remove(id) {
            handle.set_status(AgentStatus::Offline);
        }
        if let Some(mut agent) = self.persistence.get_agent(id).await? {
            agent.status = AgentStatus::Offline;
            self.persistence.put_agent(agent).await?;
        }
        Ok(())
    }

    /// Periodic liveness sweep (§6 "heartbeat every 30s; hub tolerates up
    /// to 90s of silence before marking degraded"): any `Online` agent
    /// whose `last_seen` is older than `degraded_after` becomes `Degraded`,
    /// and any `Degraded` agent silent for another `degraded_after` becomes
    /// `Offline` with its handle dropped.
    pub async fn sweep(&self, degraded_after: Duration) -> Result<()> {
        let now = chrono::Utc::now();
        for agent in self.persistence.list_agents().await? {
            if agent.status == AgentStatus::Offline {
                continue;
            }
            let silence = now.signed_duration_since(agent.last_seen);
            let silence = silence.to_std().unwrap_or(Duration::ZERO);

            let next_status = if silence >= degraded_after * 2 {
                Some(AgentStatus::Offline)
            } else if silence >= degraded_after && agent.status == AgentStatus::Online {
                Some(AgentStatus::Degraded)
            } else {
                None
            };

            if let Some(status) = next_status {
                let mut updated = agent.clone();
                updated.status = status;
                self.persistence.put_agent(updated).await?;
                if let Some(handle) = self.handles.get(&agent.id) {
                    handle.set_status(status);
                }
                if status == AgentStatus::Offline {
                    self.handles.remove(&agent.id);
                }
            }
        }
        Ok(())
    }

    pub fn connected_count(&self) -> usize {
        self.handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory::MemoryPersistence;

    fn registry() -> AgentRegistry {
        AgentRegistry::new(Arc::new(MemoryPersistence::new()))
    }

    fn sender() -> mpsc::UnboundedSender<axum::extract::ws::Message> {
        let (tx, _rx) = mpsc::unbounded_channel();
        tx
    }

    #[tokio::test]
    async fn register_then_resolve_by_name() {
        let registry = registry();
        let agent = registry
            .register("web-01".into(), "linux".into(), "1.0.0".into(), vec![], sender())
            .await
            .unwrap();

        let handle = registry.resolve("web-01").expect("handle registered");
        assert_eq!(handle.agent_id(), &agent.id);
    }

    #[tokio::test]
    async fn re_registering_known_name_rebinds_id() {
        let registry = registry();
        let first = registry
            .register("web-01".into(), "linux".into(), "1.0.0".into(), vec![], sender())
            .await
            .unwrap();
        let second = registry
            .register("web-01".into(), "linux".into(), "1.1.0".into(), vec![], sender())
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn disconnect_drops_handle_but_keeps_record() {
        let registry = registry();
        let agent = registry
            .register("web-01".into(), "linux".into(), "1.0.0".into(), vec![], sender())
            .await
            .unwrap();

        registry.disconnect(&agent.id).await.unwrap();

        assert!(registry.resolve("web-01").is_none());
        let persisted = registry.persistence.get_agent(&agent.id).await.unwrap().unwrap();
        assert_eq!(persisted.status, AgentStatus::Offline);
    }
}
