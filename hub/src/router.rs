//! Probe router (spec §4.5): the single entry point every MCP tool and
//! runbook step calls through. Inspects the pack prefix of a probe name and
//! delegates to either the integration executor or the agent dispatcher,
//! normalising both into one [`ProbeResponse`] shape.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dispatcher::{self, AgentRegistry, ProbeOutcome, WaiterTable};
use crate::domain::pack::CapabilityLevel;
use crate::error::{Error, Result};
use crate::integration::Executor;
use crate::packs::PackCatalog;

/// Outcome discriminant on the wire (§4.5: `status='error'`/`'timeout'`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeStatus {
    Success,
    Error,
    Timeout,
}

/// Metadata describing where a probe ran and under what capability ceiling,
/// surfaced to MCP clients and audit rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pack_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pack_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_level: Option<CapabilityLevel>,
}

/// The uniform result of `router::execute`, regardless of which half of the
/// system actually ran the probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub probe: String,
    pub status: ProbeStatus,
    pub data: Value,
    pub duration_ms: u64,
    pub metadata: ProbeMetadata,
}

impl ProbeResponse {
    fn error(probe: &str, duration_ms: u64, metadata: ProbeMetadata, message: &str) -> Self {
        Self {
            probe: probe.to_string(),
            status: ProbeStatus::Error,
            data: serde_json::json!({ "error": message }),
            duration_ms,
            metadata,
        }
    }
}

/// Router holding the shared collaborators every dispatch needs: the pack
/// catalog (to resolve prefix ownership and capability), the agent
/// dispatcher halves, and the integration executor.
pub struct Router {
    catalog: std::sync::Arc<PackCatalog>,
    registry: std::sync::Arc<AgentRegistry>,
    waiters: std::sync::Arc<WaiterTable>,
    executor: std::sync::Arc<Executor>,
    secret: String,
}

impl Router {
    pub fn new(
        catalog: std::sync::Arc<PackCatalog>,
        registry: std::sync::Arc<AgentRegistry>,
        waiters: std::sync::Arc<WaiterTable>,
        executor: std::sync::Arc<Executor>,
        secret: String,
    ) -> Self {
        Self {
            catalog,
            registry,
            waiters,
            executor,
            secret,
        }
    }

    /// `execute(probe, params, agent?)` (§4.5). `agent` is required unless
    /// the probe's pack prefix names a registered integration.
    pub async fn execute(
        &self,
        probe: &str,
        params: Value,
        agent: Option<&str>,
    ) -> Result<ProbeResponse> {
        let pack_name = probe
            .split_once('.')
            .map(|(prefix, _)| prefix.to_string())
            .ok_or_else(|| Error::Validation(format!("probe '{probe}' has no pack prefix")))?;

        let capability = self.catalog.capability_of(probe);
        let pack_version = self.catalog.get(&pack_name).map(|p| p.version);

        if self.catalog.is_integration_pack(&pack_name) {
            return self.execute_integration(probe, params, pack_name, pack_version, capability).await;
        }

        let Some(agent) = agent else {
            return Err(Error::Validation(format!(
                "probe '{probe}' targets an agent pack and requires an `agent`"
            )));
        };
        self.execute_agent(probe, params, agent, pack_name, pack_version, capability).await
    }

    async fn execute_agent(
        &self,
        probe: &str,
        params: Value,
        agent: &str,
        pack_name: String,
        pack_version: Option<String>,
        capability: Option<CapabilityLevel>,
    ) -> Result<ProbeResponse> {
        let timeout = self
            .catalog
            .timeout_ms_of(probe)
            .map(Duration::from_millis);

        let agent_version = match self.registry.resolve(agent) {
            Some(handle) => self
                .registry
                .agent_record(handle.agent_id())
                .await?
                .map(|record| record.agent_version),
            None => None,
        };

        let started = Instant::now();
        match dispatcher::send_probe(&self.registry, &self.waiters, agent, probe, params, timeout, &self.secret).await {
            Ok(result) => {
                let status = match result.outcome {
                    ProbeOutcome::Ok => ProbeStatus::Success,
                    ProbeOutcome::Error => ProbeStatus::Error,
                };
                Ok(ProbeResponse {
                    probe: probe.to_string(),
                    status,
                    data: result.data,
                    duration_ms: result.duration_ms,
                    metadata: ProbeMetadata {
                        agent_version,
                        pack_name: Some(pack_name),
                        pack_version,
                        capability_level: capability,
                    },
                })
            }
            Err(Error::Timeout(_)) => Ok(ProbeResponse {
                probe: probe.to_string(),
                status: ProbeStatus::Timeout,
                data: Value::Null,
                duration_ms: started.elapsed().as_millis() as u64,
                metadata: ProbeMetadata {
                    agent_version,
                    pack_name: Some(pack_name),
                    pack_version,
                    capability_level: capability,
                },
            }),
            Err(Error::AgentUnavailable { .. }) | Err(Error::Transport(_)) => Ok(ProbeResponse {
                probe: probe.to_string(),
                status: ProbeStatus::Error,
                data: Value::Null,
                duration_ms: started.elapsed().as_millis() as u64,
                metadata: ProbeMetadata {
                    agent_version,
                    pack_name: Some(pack_name),
                    pack_version,
                    capability_level: capability,
                },
            }),
            Err(other) => Err(other),
        }
    }

    async fn execute_integration(
        &self,
        probe: &str,
        params: Value,
        pack_name: String,
        pack_version: Option<String>,
        capability: Option<CapabilityLevel>,
    ) -> Result<ProbeResponse> {
        let started = Instant::now();
        let outcome = self.executor.execute_probe(probe, params).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let metadata = ProbeMetadata {
            agent_version: None,
            pack_name: Some(pack_name),
            pack_version,
            capability_level: capability,
        };

        match outcome {
            Ok(data) => Ok(ProbeResponse {
                probe: probe.to_string(),
                status: ProbeStatus::Success,
                data,
                duration_ms,
                metadata,
            }),
            Err(Error::Timeout(_)) => Ok(ProbeResponse {
                probe: probe.to_string(),
                status: ProbeStatus::Timeout,
                data: Value::Null,
                duration_ms,
                metadata,
            }),
            Err(err) => Ok(ProbeResponse::error(probe, duration_ms, metadata, &err.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::Executor;
    use crate::persistence::memory::MemoryPersistence;
    use std::sync::Arc;

    fn router() -> Router {
        let persistence = Arc::new(MemoryPersistence::new());
        Router::new(
            Arc::new(PackCatalog::new()),
            Arc::new(AgentRegistry::new(persistence.clone())),
            Arc::new(WaiterTable::new()),
            Arc::new(Executor::new(persistence)),
            "test-secret-at-least-16-chars".to_string(),
        )
    }

    #[tokio::test]
    async fn unknown_pack_prefix_without_agent_is_rejected() {
        let router = router();
        let err = router
            .execute("system.disk.usage", Value::Null, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn offline_agent_surfaces_as_error_status_not_err() {
        let router = router();
        let response = router
            .execute("system.disk.usage", Value::Null, Some("ghost"))
            .await
            .unwrap();
        assert_eq!(response.status, ProbeStatus::Error);
    }
}
