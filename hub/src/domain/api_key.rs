//! API key records and policy (spec §3 "API key", §4.2).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::Role;
use crate::ids::ApiKeyId;

/// The optional restrictions an API key's policy may carry. An absent
/// field means "no restriction on that axis" (§4.2: "an empty policy
/// means allow all").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiKeyPolicy {
    /// Exact agent names this key may target.
    #[serde(default)]
    pub allowed_agents: Option<Vec<String>>,
    /// Glob patterns (`*` matches any non-dot run) gating probe names.
    #[serde(default)]
    pub allowed_probes: Option<Vec<String>>,
    /// Ceiling on probe capability level.
    #[serde(default)]
    pub max_capability_level: Option<crate::domain::pack::CapabilityLevel>,
}

/// A stored API key record. Only the SHA-256 hash of the secret is ever
/// persisted (§4.8, §8 testable property).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    pub id: ApiKeyId,
    pub display_name: String,
    pub key_hash: String,
    pub role: Role,
    pub policy: ApiKeyPolicy,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ApiKeyRecord {
    pub fn is_valid(&self) -> bool {
        if self.revoked_at.is_some() {
            return false;
        }
        match self.expires_at {
            Some(exp) => exp > Utc::now(),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ApiKeyRecord {
        ApiKeyRecord {
            id: ApiKeyId::new(),
            display_name: "ci".into(),
            key_hash: "x".repeat(64),
            role: Role::Member,
            policy: ApiKeyPolicy::default(),
            expires_at: None,
            revoked_at: None,
            created_by: "owner".into(),
            last_used_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn revoked_key_invalid() {
        let mut key = sample();
        key.revoked_at = Some(Utc::now());
        assert!(!key.is_valid());
    }

    #[test]
    fn expired_key_invalid() {
        let mut key = sample();
        key.expires_at = Some(Utc::now() - chrono::Duration::seconds(1));
        assert!(!key.is_valid());
    }

    #[test]
    fn active_key_valid() {
        assert!(sample().is_valid());
    }
}
