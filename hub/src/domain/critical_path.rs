//! Critical paths (spec §3 "Critical path", §4.7 `check_critical_path`).

use serde::{Deserialize, Serialize};

use crate::ids::CriticalPathId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalPathTarget {
    Agent,
    Integration,
}

/// One labelled step of a critical path: a set of probes run in parallel
/// against a single target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalPathStep {
    pub label: String,
    pub target_type: CriticalPathTarget,
    /// Agent name/id or integration id, depending on `target_type`.
    pub target_id: String,
    pub probes: Vec<String>,
}

/// A named, ordered sequence of steps representing an end-to-end business
/// flow (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalPath {
    pub id: CriticalPathId,
    pub name: String,
    pub steps: Vec<CriticalPathStep>,
}
