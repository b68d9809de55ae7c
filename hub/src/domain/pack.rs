//! Pack manifests (spec §3 "Pack", §4.6 simple runbooks).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A probe's blast-radius tier, used as a policy ceiling (§4.2).
/// Ordered `Observe < Interact < Manage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityLevel {
    Observe,
    Interact,
    Manage,
}

impl std::fmt::Display for CapabilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CapabilityLevel::Observe => write!(f, "observe"),
            CapabilityLevel::Interact => write!(f, "interact"),
            CapabilityLevel::Manage => write!(f, "manage"),
        }
    }
}

/// One probe definition within a pack manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeDefinition {
    /// Name without the pack prefix, e.g. `disk.usage` under pack `system`.
    pub name: String,
    pub capability: CapabilityLevel,
    /// Timeout in milliseconds; falls back to the dispatcher/executor
    /// default (30_000) when absent.
    pub timeout_ms: Option<u64>,
    /// JSON Schema describing accepted params.
    pub param_schema: Value,
}

impl ProbeDefinition {
    /// Fully-qualified name, e.g. `system.disk.usage`.
    pub fn qualified_name(&self, pack_name: &str) -> String {
        format!("{pack_name}.{}", self.name)
    }
}

/// A simple runbook declared by a pack manifest (§4.6): a fixed list of
/// probes fanned out under one category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleRunbookManifest {
    pub category: String,
    pub probes: Vec<String>,
    #[serde(default = "default_true")]
    pub parallel: bool,
}

fn default_true() -> bool {
    true
}

/// A static pack manifest (§3 "Pack").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pack {
    pub name: String,
    pub version: String,
    pub description: String,
    pub probes: Vec<ProbeDefinition>,
    #[serde(default)]
    pub runbook: Option<SimpleRunbookManifest>,
    /// Opaque detection-rule blobs; not interpreted by the core.
    #[serde(default)]
    pub detection_rules: Vec<Value>,
    #[serde(default)]
    pub requirements: Vec<String>,
    /// Detached signature over the manifest bytes, base64-encoded.
    #[serde(default)]
    pub signature: Option<String>,
}

impl Pack {
    pub fn find_probe(&self, unqualified: &str) -> Option<&ProbeDefinition> {
        self.probes.iter().find(|p| p.name == unqualified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_ordering() {
        assert!(CapabilityLevel::Observe < CapabilityLevel::Interact);
        assert!(CapabilityLevel::Interact < CapabilityLevel::Manage);
    }

    #[test]
    fn qualified_name_joins_with_dot() {
        let probe = ProbeDefinition {
            name: "disk.usage".into(),
            capability: CapabilityLevel::Observe,
            timeout_ms: None,
            param_schema: Value::Null,
        };
        assert_eq!(probe.qualified_name("system"), "system.disk.usage");
    }
}
