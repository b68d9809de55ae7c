//! Integration records (spec §3 "Integration", §4.4).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ids::IntegrationId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    Active,
    Disabled,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialAuthMethod {
    ApiKey,
    BearerToken,
    OAuth2,
}

/// A possibly-deferred credential value. `Keeper` references are resolved
/// lazily by the integration executor (§4.4 "Keeper reference resolution")
/// before a handler is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CredentialField {
    Literal(String),
    /// `keeper://<integrationId>/<recordUid>/field/<name>`
    KeeperReference(String),
}

impl CredentialField {
    pub fn as_keeper_reference(&self) -> Option<KeeperReference> {
        match self {
            CredentialField::Literal(s) | CredentialField::KeeperReference(s) => {
                KeeperReference::parse(s)
            }
        }
    }
}

/// A parsed `keeper://` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeeperReference {
    pub integration_id: String,
    pub record_uid: String,
    pub field_name: String,
}

impl KeeperReference {
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix("keeper://")?;
        let mut parts = rest.splitn(4, '/');
        let integration_id = parts.next()?.to_string();
        let record_uid = parts.next()?.to_string();
        let literal_field = parts.next()?;
        if literal_field != "field" {
            return None;
        }
        let field_name = parts.next()?.to_string();
        Some(Self {
            integration_id,
            record_uid,
            field_name,
        })
    }
}

/// Credential bundle decrypted from an integration's encrypted config blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub auth_method: CredentialAuthMethod,
    #[serde(default)]
    pub api_key: Option<CredentialField>,
    #[serde(default)]
    pub bearer_token: Option<CredentialField>,
    #[serde(default)]
    pub access_token: Option<CredentialField>,
    #[serde(default)]
    pub refresh_token: Option<CredentialField>,
    #[serde(default)]
    pub token_expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub token_refresh_url: Option<String>,
}

/// The decrypted form of an integration's config blob (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub endpoint_url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub tls_trust: bool,
    pub credentials: Credentials,
}

/// A configured integration (§3 "Integration").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Integration {
    pub id: IntegrationId,
    /// Pack prefix this integration backs, e.g. `proxmox`.
    pub integration_type: String,
    pub name: String,
    pub config: IntegrationConfig,
    pub status: IntegrationStatus,
    pub last_test_result: Option<String>,
    pub last_test_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keeper_reference() {
        let r = KeeperReference::parse("keeper://intg_abc/rec123/field/password").unwrap();
        assert_eq!(r.integration_id, "intg_abc");
        assert_eq!(r.record_uid, "rec123");
        assert_eq!(r.field_name, "password");
    }

    #[test]
    fn rejects_malformed_keeper_reference() {
        assert!(KeeperReference::parse("keeper://intg_abc/rec123").is_none());
        assert!(KeeperReference::parse("not-a-keeper-uri").is_none());
    }
}
