//! Keeper Secrets Manager reference resolution (spec §4.4, §5).
//!
//! Credential fields may carry a `keeper://<integrationId>/<recordUid>/field/<name>`
//! reference instead of a literal value. Before an integration handler
//! runs, every reference in its credentials is resolved against the
//! Keeper integration it names, grouped by integration id so a probe that
//! touches several fields from the same record only opens one session.
//! Sessions are cached per integration id for 5 minutes (§5), matching
//! every other process-local cache in this hub.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::domain::integration::{CredentialField, Credentials, Integration, KeeperReference};
use crate::error::{Error, Result};
use crate::persistence::PersistencePort;

const SESSION_TTL: Duration = Duration::from_secs(5 * 60);

/// A secret field fetched from a Keeper record, scoped to one session.
struct CachedSession {
    fetched_at: Instant,
    /// `recordUid -> (fieldName -> value)`
    records: HashMap<String, HashMap<String, String>>,
}

impl CachedSession {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < SESSION_TTL
    }
}

/// Minimal client surface Keeper resolution needs; a trait so tests can
/// substitute a fake without reaching the real Keeper Commander API.
#[async_trait::async_trait]
pub trait KeeperClient: Send + Sync {
    /// Fetches every named record under the Keeper integration configured
    /// at `endpoint_url`, returning `recordUid -> (fieldName -> value)`.
    async fn fetch_records(
        &self,
        endpoint_url: &str,
        record_uids: &[String],
    ) -> Result<HashMap<String, HashMap<String, String>>>;
}

/// Per-integration-id session cache (§5 "Keeper session cache keyed by
/// integration ID with 5-minute expiry").
#[derive(Default)]
pub struct KeeperCache {
    sessions: DashMap<String, CachedSession>,
}

impl KeeperCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_fresh(&self, integration_id: &str) -> Option<HashMap<String, HashMap<String, String>>> {
        let entry = self.sessions.get(integration_id)?;
        if entry.is_fresh() {
            Some(entry.records.clone())
        } else {
            None
        }
    }

    fn put(&self, integration_id: String, records: HashMap<String, HashMap<String, String>>) {
        self.sessions.insert(
            integration_id,
            CachedSession {
                fetched_at: Instant::now(),
                records,
            },
        );
    }
}

/// Walks every [`CredentialField`] on `credentials`, resolving any
/// `keeper://` reference to its literal value. References are grouped by
/// the Keeper integration they name so each integration is fetched at
/// most once per call, then cached for [`SESSION_TTL`]. Fails the whole
/// resolution if a referenced integration, record, or field doesn't
/// exist (§4.4 "missing integration/record/field fails the probe").
pub async fn resolve_keeper_references(
    credentials: &Credentials,
    persistence: &dyn PersistencePort,
    client: &dyn KeeperClient,
    cache: &KeeperCache,
) -> Result<Credentials> {
    let mut references: Vec<(&'static str, KeeperReference)> = Vec::new();
    for (name, field) in credentials.fields() {
        if let Some(reference) = field.as_keeper_reference() {
            references.push((name, reference));
        }
    }

    if references.is_empty() {
        return Ok(credentials.clone());
    }

    let mut by_integration: HashMap<String, Vec<&KeeperReference>> = HashMap::new();
    for (_, reference) in &references {
        by_integration
            .entry(reference.integration_id.clone())
            .or_default()
            .push(reference);
    }

    let mut resolved: HashMap<(String, String), String> = HashMap::new();
    for (integration_id, refs) in by_integration {
        let records = match cache.get_fresh(&integration_id) {
            Some(records) => records,
            None => {
                let keeper_integration = find_keeper_integration(persistence, &integration_id).await?;
                let record_uids: Vec<String> = refs.iter().map(|r| r.record_uid.clone()).collect();
                let fetched = client
                    .fetch_records(&keeper_integration.config.endpoint_url, &record_uids)
                    .await?;
                cache.put(integration_id.clone(), fetched.clone());
                fetched
            }
        };

        for reference in refs {
            let value = records
                .get(&reference.record_uid)
                .and_then(|fields| fields.get(&reference.field_name))
                .ok_or_else(|| {
                    Error::Integration(format!(
                        "keeper record '{}' has no field '{}'",
                        reference.record_uid, reference.field_name
                    ))
                })?;
            resolved.insert(
                (reference.record_uid.clone(), reference.field_name.clone()),
                value.clone(),
            );
        }
    }

    let mut out = credentials.clone();
    out.apply_resolved(&references, &resolved);
    Ok(out)
}

async fn find_keeper_integration(
    persistence: &dyn PersistencePort,
    integration_id: &str,
) -> Result<Integration> {
    let integrations = persistence.list_integrations().await?;
    integrations
        .into_iter()
        .find(|i| i.id.as_str() == integration_id && i.integration_type == "keeper")
        .ok_or_else(|| {
            Error::Integration(format!("unknown keeper integration '{integration_id}'"))
        })
}

impl Credentials {
    /// Every named field on this bundle, for reference-scanning.
    fn fields(&self) -> Vec<(&'static str, &CredentialField)> {
        let mut out = Vec::new();
        if let Some(f) = &self.api_key {
            out.push(("api_key", f));
        }
        if let Some(f) = &self.bearer_token {
            out.push(("bearer_token", f));
        }
        if let Some(f) = &self.access_token {
            out.push(("access_token", f));
        }
        if let Some(f) = &self.refresh_token {
            out.push(("refresh_token", f));
        }
        out
    }

    fn apply_resolved(
        &mut self,
        references: &[(&'static str, KeeperReference)],
        resolved: &HashMap<(String, String), String>,
    ) {
        for (field_name, reference) in references {
            let Some(value) = resolved.get(&(reference.record_uid.clone(), reference.field_name.clone()))
            else {
                continue;
            };
            let slot = match *field_name {
                "api_key" => &mut self.api_key,
                "bearer_token" => &mut self.bearer_token,
                "access_token" => &mut self.access_token,
                "refresh_token" => &mut self.refresh_token,
                _ => continue,
            };
            *slot = Some(CredentialField::Literal(value.clone()));
        }
    }
}

/// Extracts every literal (already-resolved) value out of a credential
/// field, used by the HTTP handler once Keeper resolution has run.
pub fn literal_value(field: &Option<CredentialField>) -> Option<String> {
    match field {
        Some(CredentialField::Literal(s)) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::integration::{CredentialAuthMethod, IntegrationConfig, IntegrationStatus};
    use crate::ids::IntegrationId;
    use crate::persistence::memory::MemoryPersistence;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeKeeper {
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl KeeperClient for FakeKeeper {
        async fn fetch_records(
            &self,
            _endpoint_url: &str,
            record_uids: &[String],
        ) -> Result<HashMap<String, HashMap<String, String>>> {
            *self.calls.lock().unwrap() += 1;
            let mut out = HashMap::new();
            for uid in record_uids {
                let mut fields = HashMap::new();
                fields.insert("password".to_string(), format!("secret-for-{uid}"));
                out.insert(uid.clone(), fields);
            }
            Ok(out)
        }
    }

    async fn seed_keeper_integration(persistence: &MemoryPersistence, id: IntegrationId) {
        persistence
            .put_integration(Integration {
                id,
                integration_type: "keeper".to_string(),
                name: "keeper vault".to_string(),
                config: IntegrationConfig {
                    endpoint_url: "https://keeper.example.com".to_string(),
                    headers: Default::default(),
                    tls_trust: true,
                    credentials: Credentials {
                        auth_method: CredentialAuthMethod::ApiKey,
                        api_key: None,
                        bearer_token: None,
                        access_token: None,
                        refresh_token: None,
                        token_expiry: None,
                        token_refresh_url: None,
                    },
                },
                status: IntegrationStatus::Active,
                last_test_result: None,
                last_test_at: None,
                created_at: chrono::Utc::now(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn resolves_a_keeper_reference_to_a_literal() {
        let persistence = MemoryPersistence::new();
        let integration_id = IntegrationId::new();
        seed_keeper_integration(&persistence, integration_id.clone()).await;
        let client = FakeKeeper { calls: Mutex::new(0) };
        let cache = KeeperCache::new();

        let credentials = Credentials {
            auth_method: CredentialAuthMethod::ApiKey,
            api_key: Some(CredentialField::KeeperReference(format!(
                "keeper://{}/rec1/field/password",
                integration_id.as_str()
            ))),
            bearer_token: None,
            access_token: None,
            refresh_token: None,
            token_expiry: None,
            token_refresh_url: None,
        };

        let resolved = resolve_keeper_references(&credentials, &persistence, &client, &cache)
            .await
            .unwrap();
        assert_eq!(literal_value(&resolved.api_key).unwrap(), "secret-for-rec1");
        assert_eq!(*client.calls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_keeper_integration_fails() {
        let persistence = MemoryPersistence::new();
        let client = FakeKeeper { calls: Mutex::new(0) };
        let cache = KeeperCache::new();

        let credentials = Credentials {
            auth_method: CredentialAuthMethod::ApiKey,
            api_key: Some(CredentialField::KeeperReference(
                "keeper://intg_missing/rec1/field/password".to_string(),
            )),
            bearer_token: None,
            access_token: None,
            refresh_token: None,
            token_expiry: None,
            token_refresh_url: None,
        };

        let err = resolve_keeper_references(&credentials, &persistence, &client, &cache)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Integration(_)));
    }
}
