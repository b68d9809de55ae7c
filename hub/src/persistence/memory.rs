//! In-memory `PersistencePort` backing unit tests for every component
//! above the persistence line (§4.1 "Addition").

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::{IntegrationEvent, PersistencePort};
use crate::audit::event::AuditEvent;
use crate::domain::{Agent, ApiKeyRecord, CriticalPath, Integration};
use crate::error::Result;
use crate::ids::{AgentId, ApiKeyId, CriticalPathId, IntegrationId};

#[derive(Default)]
pub struct MemoryPersistence {
    agents: DashMap<AgentId, Agent>,
    api_keys: DashMap<ApiKeyId, ApiKeyRecord>,
    integrations: DashMap<IntegrationId, Integration>,
    critical_paths: DashMap<CriticalPathId, CriticalPath>,
    audit: DashMap<u64, AuditEvent>,
    audit_seq: std::sync::atomic::AtomicU64,
    integration_events: DashMap<u64, IntegrationEvent>,
    integration_events_seq: std::sync::atomic::AtomicU64,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistencePort for MemoryPersistence {
    async fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>> {
        Ok(self.agents.get(id).map(|a| a.clone()))
    }

    async fn get_agent_by_name(&self, name: &str) -> Result<Option<Agent>> {
        Ok(self.agents.iter().find(|a| a.name == name).map(|a| a.clone()))
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        Ok(self.agents.iter().map(|a| a.clone()).collect())
    }

    async fn put_agent(&self, agent: Agent) -> Result<()> {
        self.agents.insert(agent.id.clone(), agent);
        Ok(())
    }

    async fn get_api_key_by_hash(&self, hash: &str) -> Result<Option<ApiKeyRecord>> {
        Ok(self.api_keys.iter().find(|k| k.key_hash == hash).map(|k| k.clone()))
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKeyRecord>> {
        Ok(self.api_keys.iter().map(|k| k.clone()).collect())
    }

    async fn put_api_key(&self, key: ApiKeyRecord) -> Result<()> {
        self.api_keys.insert(key.id.clone(), key);
        Ok(())
    }

    async fn touch_api_key_last_used(&self, id: &ApiKeyId) -> Result<()> {
        if let Some(mut entry) = self.api_keys.get_mut(id) {
            entry.last_used_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_integration(&self, id: &IntegrationId) -> Result<Option<Integration>> {
        Ok(self.integrations.get(id).map(|i| i.clone()))
    }

    async fn list_integrations(&self) -> Result<Vec<Integration>> {
        Ok(self.integrations.iter().map(|i| i.clone()).collect())
    }

    async fn put_integration(&self, integration: Integration) -> Result<()> {
        self.integrations.insert(integration.id.clone(), integration);
        Ok(())
    }

    async fn get_critical_path(&self, id: &CriticalPathId) -> Result<Option<CriticalPath>> {
        Ok(self.critical_paths.get(id).map(|c| c.clone()))
    }

    async fn get_critical_path_by_name(&self, name: &str) -> Result<Option<CriticalPath>> {
        Ok(self.critical_paths.iter().find(|c| c.name == name).map(|c| c.clone()))
    }

    async fn list_critical_paths(&self) -> Result<Vec<CriticalPath>> {
        Ok(self.critical_paths.iter().map(|c| c.clone()).collect())
    }

    async fn append_audit(&self, event: AuditEvent) -> Result<()> {
        let seq = self.audit_seq.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.audit.insert(seq, event);
        Ok(())
    }

    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        let mut rows: Vec<_> = self.audit.iter().map(|r| (*r.key(), r.value().clone())).collect();
        rows.sort_by_key(|(seq, _)| *seq);
        Ok(rows.into_iter().rev().take(limit).map(|(_, e)| e).collect())
    }

    async fn append_integration_event(&self, event: IntegrationEvent) -> Result<()> {
        let seq = self
            .integration_events_seq
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.integration_events.insert(seq, event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agent::Agent as AgentRecord;

    #[tokio::test]
    async fn put_then_get_agent_by_name() {
        let store = MemoryPersistence::new();
        let agent = AgentRecord::new("srv1".into(), "linux".into(), "1.0".into(), vec![]);
        store.put_agent(agent.clone()).await.unwrap();
        let found = store.get_agent_by_name("srv1").await.unwrap().unwrap();
        assert_eq!(found.id, agent.id);
    }

    #[tokio::test]
    async fn audit_is_append_only_and_ordered_newest_first() {
        let store = MemoryPersistence::new();
        for i in 0..3u8 {
            let event = AuditEvent::new(
                crate::audit::event::AuditEventKind::Custom(format!("probe-{i}")),
                crate::audit::event::AuditSeverity::Informational,
                "sonde-hub".into(),
            );
            store.append_audit(event).await.unwrap();
        }
        let rows = store.list_audit(10).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].kind.to_string(), "custom.probe-2");
    }
}
