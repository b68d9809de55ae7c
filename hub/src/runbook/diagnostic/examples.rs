//! Two worked diagnostic runbooks, shipped as examples of the shape a pack
//! author writes against [`super::DiagnosticRunbook`]: `system-health`
//! drives the built-in `system` agent pack, `proxmox-cluster` drives the
//! built-in `proxmox` integration pack (mirroring a degraded-cluster
//! triage session).

use async_trait::async_trait;
use serde_json::Value;

use super::{DiagnosticRunbook, DiagnosticRunbookResult, DiagnosticRunbookSummary, Finding, RunbookContext, Severity};
use crate::error::{Error, Result};
use crate::router::ProbeStatus;

const DISK_WARNING_PERCENT: f64 = 80.0;
const DISK_CRITICAL_PERCENT: f64 = 95.0;
const MEMORY_WARNING_PERCENT: f64 = 85.0;
const LOAD_WARNING_PER_CORE: f64 = 1.5;

fn percent_field(data: &Value, field: &str) -> Option<f64> {
    data.get(field).and_then(Value::as_f64)
}

/// Disk/memory/process triage for one host (§4.6 worked example).
pub struct SystemHealthRunbook;

#[async_trait]
impl DiagnosticRunbook for SystemHealthRunbook {
    fn category(&self) -> &str {
        "system-health"
    }

    async fn run(&self, params: Value, ctx: &RunbookContext<'_>) -> Result<DiagnosticRunbookResult> {
        let agent = params
            .get("agent")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| ctx.connected_agents.first().cloned())
            .ok_or_else(|| Error::Validation("system-health requires an agent or a connected fleet".to_string()))?;

        let disk = ctx.run_probe("system.disk.usage", Value::Null, Some(&agent)).await?;
        let memory = ctx.run_probe("system.memory.usage", Value::Null, Some(&agent)).await?;
        let ps = ctx.run_probe("system.ps", Value::Null, Some(&agent)).await?;

        let mut findings = Vec::new();
        let mut probe_results = std::collections::HashMap::new();

        if disk.status == ProbeStatus::Success {
            if let Some(used) = percent_field(&disk.data, "percent_used") {
                if used >= DISK_CRITICAL_PERCENT {
                    findings.push(Finding {
                        severity: Severity::Critical,
                        title: "Disk nearly full".to_string(),
                        detail: format!("{used:.1}% of disk in use on {agent}"),
                        remediation: Some("Free space or extend the volume before it fills.".to_string()),
                        related_probes: vec!["system.disk.usage".to_string()],
                    });
                } else if used >= DISK_WARNING_PERCENT {
                    findings.push(Finding {
                        severity: Severity::Warning,
                        title: "Disk usage climbing".to_string(),
                        detail: format!("{used:.1}% of disk in use on {agent}"),
                        remediation: None,
                        related_probes: vec!["system.disk.usage".to_string()],
                    });
                }
            }
        } else {
            findings.push(Finding {
                severity: Severity::Warning,
                title: "Disk probe unavailable".to_string(),
                detail: format!("system.disk.usage did not succeed against {agent}"),
                remediation: None,
                related_probes: vec!["system.disk.usage".to_string()],
            });
        }

        if memory.status == ProbeStatus::Success {
            if let Some(used) = percent_field(&memory.data, "percent_used") {
                if used >= MEMORY_WARNING_PERCENT {
                    findings.push(Finding {
                        severity: Severity::Warning,
                        title: "Memory pressure".to_string(),
                        detail: format!("{used:.1}% of memory in use on {agent}"),
                        remediation: Some("Check for a runaway process before it triggers the OOM killer.".to_string()),
                        related_probes: vec!["system.memory.usage".to_string(), "system.ps".to_string()],
                    });
                }
            }
        }

        if ps.status == ProbeStatus::Success {
            if let Some(load) = percent_field(&ps.data, "load_per_core") {
                if load >= LOAD_WARNING_PER_CORE {
                    findings.push(Finding {
                        severity: Severity::Warning,
                        title: "Load average elevated".to_string(),
                        detail: format!("{load:.2} load per core on {agent}"),
                        remediation: None,
                        related_probes: vec!["system.ps".to_string()],
                    });
                }
            }
        }

        if findings.is_empty() {
            findings.push(Finding {
                severity: Severity::Info,
                title: "No anomalies detected".to_string(),
                detail: format!("Disk, memory, and process probes all returned nominal readings for {agent}"),
                remediation: None,
                related_probes: vec![
                    "system.disk.usage".to_string(),
                    "system.memory.usage".to_string(),
                    "system.ps".to_string(),
                ],
            });
        }

        probe_results.insert("system.disk.usage".to_string(), disk);
        probe_results.insert("system.memory.usage".to_string(), memory);
        probe_results.insert("system.ps".to_string(), ps);

        let summary = DiagnosticRunbookSummary {
            probes_run: probe_results.len(),
            findings_count: findings.len(),
            duration_ms: 0,
        };
        super::sort_by_severity(&mut findings);

        Ok(DiagnosticRunbookResult {
            findings,
            probe_results,
            summary,
            truncated: false,
            timed_out: false,
        })
    }
}

/// Cluster-wide quorum/node triage against the `proxmox` integration
/// (mirrors a degraded-cluster walkthrough: quorum lost, then a node
/// found offline).
pub struct ProxmoxClusterRunbook;

#[async_trait]
impl DiagnosticRunbook for ProxmoxClusterRunbook {
    fn category(&self) -> &str {
        "proxmox-cluster"
    }

    async fn run(&self, _params: Value, ctx: &RunbookContext<'_>) -> Result<DiagnosticRunbookResult> {
        let cluster = ctx.run_probe("proxmox.cluster.status", Value::Null, None).await?;
        let nodes = ctx.run_probe("proxmox.node.status", Value::Null, None).await?;

        let mut findings = Vec::new();

        let quorate = cluster
            .data
            .get("quorate")
            .and_then(Value::as_bool)
            .unwrap_or(cluster.status == ProbeStatus::Success);
        if !quorate {
            findings.push(Finding {
                severity: Severity::Critical,
                title: "Cluster has lost quorum".to_string(),
                detail: "proxmox.cluster.status reports the cluster is not quorate".to_string(),
                remediation: Some("Restore connectivity between nodes or adjust expected votes.".to_string()),
                related_probes: vec!["proxmox.cluster.status".to_string()],
            });
        }

        if let Some(offline) = nodes.data.get("offline_nodes").and_then(Value::as_array) {
            for node in offline {
                if let Some(name) = node.as_str() {
                    findings.push(Finding {
                        severity: Severity::Critical,
                        title: format!("Node {name} is offline"),
                        detail: format!("proxmox.node.status reports {name} unreachable"),
                        remediation: Some(format!("Check power and network connectivity for {name}.")),
                        related_probes: vec!["proxmox.node.status".to_string()],
                    });
                }
            }
        }

        if findings.is_empty() {
            findings.push(Finding {
                severity: Severity::Info,
                title: "Cluster healthy".to_string(),
                detail: "Quorum held and all nodes reported online".to_string(),
                remediation: None,
                related_probes: vec!["proxmox.cluster.status".to_string(), "proxmox.node.status".to_string()],
            });
        }

        let mut probe_results = std::collections::HashMap::new();
        probe_results.insert("proxmox.cluster.status".to_string(), cluster);
        probe_results.insert("proxmox.node.status".to_string(), nodes);

        let summary = DiagnosticRunbookSummary {
            probes_run: probe_results.len(),
            findings_count: findings.len(),
            duration_ms: 0,
        };
        super::sort_by_severity(&mut findings);

        Ok(DiagnosticRunbookResult {
            findings,
            probe_results,
            summary,
            truncated: false,
            timed_out: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dispatcher::{AgentRegistry, WaiterTable};
    use crate::integration::Executor;
    use crate::packs::PackCatalog;
    use crate::persistence::memory::MemoryPersistence;
    use crate::router::Router;
    use crate::runbook::DiagnosticRunbookRegistry;

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
    async fn system_health_requires_an_agent_when_fleet_is_empty() {
        let mut registry = DiagnosticRunbookRegistry::new();
        registry.register(Arc::new(SystemHealthRunbook));
        let router = router();
        let err = registry
            .execute("system-health", Value::Null, &router, vec![], None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn system_health_surfaces_a_finding_against_an_offline_agent() {
        let mut registry = DiagnosticRunbookRegistry::new();
        registry.register(Arc::new(SystemHealthRunbook));
        let router = router();
        let result = registry
            .execute("system-health", serde_json::json!({"agent": "ghost"}), &router, vec![], None)
            .await
            .unwrap();
        assert_eq!(result.probe_results.len(), 3);
        assert!(!result.findings.is_empty());
    }

    #[tokio::test]
    async fn proxmox_cluster_runs_against_an_unconfigured_integration() {
        let mut registry = DiagnosticRunbookRegistry::new();
        registry.register(Arc::new(ProxmoxClusterRunbook));
        let router = router();
        let result = registry
            .execute("proxmox-cluster", Value::Null, &router, vec![], None)
            .await
            .unwrap();
        assert_eq!(result.probe_results.len(), 2);
        assert!(!result.findings.is_empty());
    }
}
