//! Agent records (spec §3 "Agent").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::AgentId;

/// Liveness state of a registered agent.
///
/// `Online` while its WebSocket is the authoritative connection,
/// `Degraded` after 90s without a heartbeat (§6, open question resolved in
/// DESIGN.md), `Offline` once the socket has closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Online,
    Degraded,
    Offline,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Online => write!(f, "online"),
            AgentStatus::Degraded => write!(f, "degraded"),
            AgentStatus::Offline => write!(f, "offline"),
        }
    }
}

/// A pack loaded by an agent, as reported at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedPack {
    pub name: String,
    pub version: String,
    pub status: String,
}

/// A registered agent (spec §3). Created on first successful
/// `agent.register`, mutated on every reconnect/heartbeat, never deleted
/// automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    /// Human-chosen, unique name. A registration carrying a known name
    /// rebinds `id` to the existing record rather than minting a new one.
    pub name: String,
    pub os: String,
    pub agent_version: String,
    pub packs: Vec<LoadedPack>,
    pub last_seen: DateTime<Utc>,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(name: String, os: String, agent_version: String, packs: Vec<LoadedPack>) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new(),
            name,
            os,
            agent_version,
            packs,
            last_seen: now,
            status: AgentStatus::Online,
            created_at: now,
        }
    }

    /// Re-applies a fresh registration onto an existing record, keeping
    /// the original id (spec §3 invariant: "an incoming registration with
    /// a known name rebinds the existing ID").
    pub fn rebind(&mut self, os: String, agent_version: String, packs: Vec<LoadedPack>) {
        self.os = os;
        self.agent_version = agent_version;
        self.packs = packs;
        self.last_seen = Utc::now();
        self.status = AgentStatus::Online;
    }

    pub fn touch_heartbeat(&mut self) {
        self.last_seen = Utc::now();
        if self.status == AgentStatus::Degraded {
            self.status = AgentStatus::Online;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rebind_preserves_id() {
        let mut agent = Agent::new("srv1".into(), "linux".into(), "1.0.0".into(), vec![]);
        let id = agent.id.clone();
        agent.rebind("linux".into(), "1.1.0".into(), vec![]);
        assert_eq!(agent.id, id);
        assert_eq!(agent.agent_version, "1.1.0");
        assert_eq!(agent.status, AgentStatus::Online);
    }

    #[test]
    fn heartbeat_clears_degraded() {
        let mut agent = Agent::new("srv1".into(), "linux".into(), "1.0.0".into(), vec![]);
        agent.status = AgentStatus::Degraded;
        agent.touch_heartbeat();
        assert_eq!(agent.status, AgentStatus::Online);
    }
}
