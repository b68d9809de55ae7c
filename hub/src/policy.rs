//! Policy evaluator (spec §4.2): a pure function deciding whether a given
//! [`AuthContext`](crate::auth::AuthContext) may touch a given
//! (agent-or-source, probe). Holds no state and performs no I/O — every
//! input it needs is already resolved by the caller.

use serde::{Deserialize, Serialize};

use crate::domain::api_key::ApiKeyPolicy;
use crate::domain::pack::CapabilityLevel;

/// Outcome of a policy check, carrying a human-readable reason on denial
/// so it can be surfaced verbatim in an MCP `isError` result (§7).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub reason: Option<String>,
}

impl PolicyDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
        }
    }
}

/// Checks `allowed_agents` in isolation (§4.2: "also exposes
/// `evaluate_agent_access`").
pub fn evaluate_agent_access(policy: &ApiKeyPolicy, agent_or_source: &str) -> PolicyDecision {
    match &policy.allowed_agents {
        None => PolicyDecision::allow(),
        Some(allowed) => {
            if allowed.iter().any(|a| a == agent_or_source) {
                PolicyDecision::allow()
            } else {
                PolicyDecision::deny(format!(
                    "agent '{agent_or_source}' is not in the allowed-agents list"
                ))
            }
        }
    }
}

/// Full probe-access check: agent allowlist, probe glob allowlist, and
/// capability ceiling, in that order, short-circuiting on first failure.
pub fn evaluate_probe_access(
    policy: &ApiKeyPolicy,
    agent_or_source: Option<&str>,
    probe_name: &str,
    probe_capability: Option<CapabilityLevel>,
) -> PolicyDecision {
    if let Some(agent_or_source) = agent_or_source {
        let agent_decision = evaluate_agent_access(policy, agent_or_source);
        if !agent_decision.allowed {
            return agent_decision;
        }
    }

    if let Some(patterns) = &policy.allowed_probes {
        if !patterns.iter().any(|pat| glob_match(pat, probe_name)) {
            return PolicyDecision::deny(format!(
                "probe '{probe_name}' does not match any allowed-probes pattern"
            ));
        }
    }

    if let (Some(ceiling), Some(capability)) = (policy.max_capability_level, probe_capability) {
        if capability > ceiling {
            return PolicyDecision::deny(format!(
                "probe '{probe_name}' requires capability '{capability}' above the allowed ceiling '{ceiling}'"
            ));
        }
    }

    PolicyDecision::allow()
}

/// Glob matcher used for `allowed_probes` patterns: `*` matches any run of
/// characters, including further `.`-separated segments (so a trailing
/// `system.*` allows the whole `system` pack, e.g. `system.disk.usage` —
/// the exact case in §8's testable properties). No other metacharacters
/// are interpreted; everything else in the pattern is matched literally.
pub fn glob_match(pattern: &str, candidate: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    let mut regex_src = String::with_capacity(pattern.len() + 8);
    regex_src.push('^');
    for (i, part) in parts.iter().enumerate() {
        regex_src.push_str(&regex::escape(part));
        if i + 1 < parts.len() {
            regex_src.push_str(".*");
        }
    }
    regex_src.push('$');
    regex::Regex::new(&regex_src)
        .map(|re| re.is_match(candidate))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_policy_allows_everything() {
        let policy = ApiKeyPolicy::default();
        let decision = evaluate_probe_access(&policy, Some("srv2"), "docker.containers.list", None);
        assert!(decision.allowed);
    }

    #[test]
    fn allowed_probes_glob_gates_pack() {
        let policy = ApiKeyPolicy {
            allowed_probes: Some(vec!["system.*".to_string()]),
            ..Default::default()
        };
        assert!(evaluate_probe_access(&policy, None, "system.disk.usage", None).allowed);
        assert!(!evaluate_probe_access(&policy, None, "docker.containers.list", None).allowed);
    }

    #[test]
    fn allowed_agents_exact_match() {
        let policy = ApiKeyPolicy {
            allowed_agents: Some(vec!["srv1".to_string()]),
            ..Default::default()
        };
        assert!(evaluate_agent_access(&policy, "srv1").allowed);
        let denied = evaluate_agent_access(&policy, "srv2");
        assert!(!denied.allowed);
        assert!(denied.reason.unwrap().contains("srv2"));
    }

    #[test]
    fn max_capability_level_ceiling() {
        let policy = ApiKeyPolicy {
            max_capability_level: Some(CapabilityLevel::Observe),
            ..Default::default()
        };
        assert!(evaluate_probe_access(&policy, None, "system.disk.usage", Some(CapabilityLevel::Observe)).allowed);
        assert!(!evaluate_probe_access(&policy, None, "system.service.restart", Some(CapabilityLevel::Manage)).allowed);
    }

    #[test]
    fn glob_star_matches_rest_of_pack() {
        assert!(glob_match("system.*", "system.disk.usage"));
        assert!(glob_match("system.*", "system.ps"));
        assert!(!glob_match("system.*", "docker.containers.list"));
    }
}
