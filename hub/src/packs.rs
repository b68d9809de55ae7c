//! Built-in pack catalogue (spec §3 "Pack", §4.4, §4.6).
//!
//! Packs are static manifests in the real system; probe code lives with the
//! agent (for agent-targeted packs) or with an integration handler (for
//! integration-targeted packs) and is out of scope here (§1). What the core
//! needs is the manifest metadata — capability levels, timeouts, simple
//! runbook declarations — so [`crate::policy`], [`crate::router`], and
//! [`crate::runbook::simple`] can resolve a probe name without asking the
//! agent. [`PackCatalog`] holds that metadata, seeded at startup with the
//! packs this hub ships with, plus whatever packs a connecting agent's
//! `agent.register` reports (§4.3) so unfamiliar agent packs still resolve.

use dashmap::DashMap;
use serde_json::json;

use crate::domain::pack::{CapabilityLevel, Pack, ProbeDefinition, SimpleRunbookManifest};

/// Registry of known pack manifests, keyed by pack name (the prefix before
/// the first `.` in a fully-qualified probe name).
///
/// Agent-reported packs (`LoadedPack` in `agent.register`) only carry a
/// name/version/status, not full probe definitions; `register_loaded` is a
/// best-effort merge that leaves the capability/param-schema detail absent
/// for packs this catalog doesn't already know about, which is why
/// `capability_of` returns `Option`.
pub struct PackCatalog {
    packs: DashMap<String, Pack>,
    integration_packs: DashMap<String, ()>,
}

impl PackCatalog {
    pub fn new() -> Self {
        let catalog = Self {
            packs: DashMap::new(),
            integration_packs: DashMap::new(),
        };
        for pack in builtin_agent_packs() {
            catalog.packs.insert(pack.name.clone(), pack);
        }
        for name in ["proxmox", "checkpoint", "keeper", "vcenter"] {
            catalog.integration_packs.insert(name.to_string(), ());
        }
        for pack in builtin_integration_packs() {
            catalog.integration_packs.insert(pack.name.clone(), ());
            catalog.packs.insert(pack.name.clone(), pack);
        }
        catalog
    }

    /// Whether `pack_name` is served by the integration executor rather than
    /// the agent dispatcher (§4.5 "inspects the pack prefix").
    pub fn is_integration_pack(&self, pack_name: &str) -> bool {
        self.integration_packs.contains_key(pack_name)
    }

    pub fn get(&self, pack_name: &str) -> Option<Pack> {
        self.packs.get(pack_name).map(|p| p.clone())
    }

    pub fn list(&self) -> Vec<Pack> {
        self.packs.iter().map(|e| e.value().clone()).collect()
    }

    /// Looks up the capability level for a fully-qualified probe name, e.g.
    /// `system.disk.usage`, by splitting on the first `.`.
    pub fn capability_of(&self, qualified_probe: &str) -> Option<CapabilityLevel> {
        let (pack_name, rest) = qualified_probe.split_once('.')?;
        let pack = self.packs.get(pack_name)?;
        pack.find_probe(rest).map(|p| p.capability)
    }

    pub fn timeout_ms_of(&self, qualified_probe: &str) -> Option<u64> {
        let (pack_name, rest) = qualified_probe.split_once('.')?;
        let pack = self.packs.get(pack_name)?;
        pack.find_probe(rest).and_then(|p| p.timeout_ms)
    }

    /// Registers or refreshes a pack manifest, e.g. one learned from an
    /// agent's `agent.register` payload.
    pub fn register(&self, pack: Pack) {
        self.packs.insert(pack.name.clone(), pack);
    }
}

impl Default for PackCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn observe(name: &str) -> ProbeDefinition {
    ProbeDefinition {
        name: name.to_string(),
        capability: CapabilityLevel::Observe,
        timeout_ms: None,
        param_schema: json!({"type": "object"}),
    }
}

fn interact(name: &str) -> ProbeDefinition {
    ProbeDefinition {
        name: name.to_string(),
        capability: CapabilityLevel::Interact,
        timeout_ms: None,
        param_schema: json!({"type": "object"}),
    }
}

fn manage(name: &str) -> ProbeDefinition {
    ProbeDefinition {
        name: name.to_string(),
        capability: CapabilityLevel::Manage,
        timeout_ms: None,
        param_schema: json!({"type": "object"}),
    }
}

/// Packs whose probes are executed by the agent process on the remote host.
fn builtin_agent_packs() -> Vec<Pack> {
    vec![
        Pack {
            name: "system".to_string(),
            version: "1.0.0".to_string(),
            description: "Host-level OS diagnostics".to_string(),
            probes: vec![
                observe("disk.usage"),
                observe("ps"),
                observe("memory.usage"),
                observe("network.connections"),
                manage("service.restart"),
            ],
            runbook: Some(SimpleRunbookManifest {
                category: "system-health".to_string(),
                probes: vec![
                    "system.disk.usage".to_string(),
                    "system.memory.usage".to_string(),
                    "system.ps".to_string(),
                ],
                parallel: true,
            }),
            detection_rules: vec![],
            requirements: vec![],
            signature: None,
        },
        Pack {
            name: "docker".to_string(),
            version: "1.0.0".to_string(),
            description: "Docker container diagnostics".to_string(),
            probes: vec![
                observe("containers.list"),
                observe("logs.tail"),
                observe("stats"),
                interact("container.restart"),
            ],
            runbook: Some(SimpleRunbookManifest {
                category: "docker-health".to_string(),
                probes: vec!["docker.containers.list".to_string(), "docker.stats".to_string()],
                parallel: true,
            }),
            detection_rules: vec![],
            requirements: vec!["docker".to_string()],
            signature: None,
        },
        Pack {
            name: "nginx".to_string(),
            version: "1.0.0".to_string(),
            description: "nginx access/error log and config diagnostics".to_string(),
            probes: vec![
                observe("access.log.tail"),
                observe("error.log.tail"),
                observe("config.test"),
                interact("reload"),
            ],
            runbook: None,
            detection_rules: vec![],
            requirements: vec!["nginx".to_string()],
            signature: None,
        },
        Pack {
            name: "systemd".to_string(),
            version: "1.0.0".to_string(),
            description: "systemd unit and journal diagnostics".to_string(),
            probes: vec![
                observe("journal.query"),
                observe("unit.status"),
                interact("unit.restart"),
            ],
            runbook: None,
            detection_rules: vec![],
            requirements: vec!["systemd".to_string()],
            signature: None,
        },
    ]
}

/// Packs whose probes are executed in-process by the integration executor
/// against a remote HTTP API (§4.4).
fn builtin_integration_packs() -> Vec<Pack> {
    vec![
        Pack {
            name: "proxmox".to_string(),
            version: "1.0.0".to_string(),
            description: "Proxmox VE cluster diagnostics".to_string(),
            probes: vec![
                observe("cluster.status"),
                observe("vm.list"),
                observe("node.status"),
                interact("vm.restart"),
            ],
            runbook: Some(SimpleRunbookManifest {
                category: "proxmox-cluster".to_string(),
                probes: vec!["proxmox.cluster.status".to_string(), "proxmox.node.status".to_string()],
                parallel: true,
            }),
            detection_rules: vec![],
            requirements: vec![],
            signature: None,
        },
        Pack {
            name: "checkpoint".to_string(),
            version: "1.0.0".to_string(),
            description: "Check Point gateway diagnostics".to_string(),
            probes: vec![observe("gateway.status"), observe("policy.installed")],
            runbook: None,
            detection_rules: vec![],
            requirements: vec![],
            signature: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_packs_resolve_capability() {
        let catalog = PackCatalog::new();
        assert_eq!(
            catalog.capability_of("system.disk.usage"),
            Some(CapabilityLevel::Observe)
        );
        assert_eq!(
            catalog.capability_of("system.service.restart"),
            Some(CapabilityLevel::Manage)
        );
    }

    #[test]
    fn unknown_probe_has_no_capability() {
        let catalog = PackCatalog::new();
        assert_eq!(catalog.capability_of("unknown.probe"), None);
    }

    #[test]
    fn integration_packs_are_flagged() {
        let catalog = PackCatalog::new();
        assert!(catalog.is_integration_pack("proxmox"));
        assert!(!catalog.is_integration_pack("system"));
    }

    #[test]
    fn registering_a_pack_overrides_lookup() {
        let catalog = PackCatalog::new();
        catalog.register(Pack {
            name: "custom".to_string(),
            version: "0.1.0".to_string(),
            description: "agent-reported".to_string(),
            probes: vec![observe("ping")],
            runbook: None,
            detection_rules: vec![],
            requirements: vec![],
            signature: None,
        });
        assert_eq!(catalog.capability_of("custom.ping"), Some(CapabilityLevel::Observe));
    }
}
