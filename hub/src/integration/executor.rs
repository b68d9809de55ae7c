//! Integration executor (spec §4.4): the probe router's counterpart to
//! [`crate::dispatcher::send_probe`] for probes owned by an integration
//! pack rather than an agent.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;

use crate::domain::integration::Integration;
use crate::error::{Error, Result};
use crate::ids::IntegrationId;
use crate::integration::handler::{GenericHttpHandler, HandlerContext, IntegrationHandler};
use crate::integration::keeper::{literal_value, resolve_keeper_references, KeeperCache, KeeperClient};
use crate::integration::retry::{retry_with_backoff, RetryOutcome};
use crate::persistence::{IntegrationEvent, PersistencePort};

const DEFAULT_INTEGRATION_TIMEOUT: Duration = Duration::from_secs(30);

/// No-op Keeper client used when an installation has no Keeper
/// integration configured — references still fail with a clear error
/// rather than panicking on a missing collaborator.
struct UnconfiguredKeeperClient;

#[async_trait::async_trait]
impl KeeperClient for UnconfiguredKeeperClient {
    async fn fetch_records(
        &self,
        _endpoint_url: &str,
        _record_uids: &[String],
    ) -> Result<HashMap<String, HashMap<String, String>>> {
        Err(Error::Integration(
            "no Keeper client is configured for this hub".to_string(),
        ))
    }
}

/// Runs integration-owned probes: resolves `pack_name.probe_path` against
/// the registered [`Integration`] for that pack, substitutes any Keeper
/// references in its credentials, then retries the HTTP call per §4.4's
/// policy, refreshing an OAuth2 access token on a first-attempt 401.
pub struct Executor {
    persistence: Arc<dyn PersistencePort>,
    handler: Arc<dyn IntegrationHandler>,
    keeper_client: Arc<dyn KeeperClient>,
    keeper_cache: KeeperCache,
    /// OAuth2 access tokens refreshed mid-call, keyed by integration id,
    /// so a refresh made for one probe is reused by the next rather than
    /// refreshed again on every call.
    refreshed_tokens: DashMap<String, (String, chrono::DateTime<Utc>)>,
}

impl Executor {
    pub fn new(persistence: Arc<dyn PersistencePort>) -> Self {
        Self {
            persistence,
            handler: Arc::new(GenericHttpHandler::new()),
            keeper_client: Arc::new(UnconfiguredKeeperClient),
            keeper_cache: KeeperCache::new(),
            refreshed_tokens: DashMap::new(),
        }
    }

    /// Wires a real Keeper client, for deployments with a Keeper
    /// integration configured.
    pub fn with_keeper_client(mut self, client: Arc<dyn KeeperClient>) -> Self {
        self.keeper_client = client;
        self
    }

    /// Executes `probe` (fully-qualified, e.g. `proxmox.vm.restart`)
    /// against the registered integration for its pack prefix.
    pub async fn execute_probe(&self, probe: &str, params: Value) -> Result<Value> {
        let (pack_name, probe_path) = probe
            .split_once('.')
            .ok_or_else(|| Error::Validation(format!("probe '{probe}' has no pack prefix")))?;

        let integration = self.find_integration(pack_name).await?;
        let integration_id = integration.id.as_str().to_string();

        let credentials = resolve_keeper_references(
            &integration.config.credentials,
            self.persistence.as_ref(),
            self.keeper_client.as_ref(),
            &self.keeper_cache,
        )
        .await?;

        let mut config = integration.config.clone();
        config.credentials = credentials;

        let result = retry_with_backoff(|attempt| {
            let config = config.clone();
            let params = params.clone();
            let probe_path = probe_path.to_string();
            let probe = probe.to_string();
            let integration_id = integration_id.clone();
            let integration_id_for_log = integration.id.clone();
            async move {
                self.run_attempt(
                    attempt,
                    &integration_id,
                    &integration_id_for_log,
                    &config,
                    &probe_path,
                    &probe,
                    &params,
                )
                .await
            }
        })
        .await;

        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_attempt(
        &self,
        attempt: u32,
        integration_id: &str,
        integration_id_for_log: &IntegrationId,
        config: &crate::domain::integration::IntegrationConfig,
        probe_path: &str,
        probe: &str,
        params: &Value,
    ) -> RetryOutcome<Value> {
        let timeout = DEFAULT_INTEGRATION_TIMEOUT;

        // Pick up a token refreshed by an earlier attempt in this call (or a
        // prior call to the same integration) before sending the request, so
        // a refresh never retries with the access token that just 401'd.
        let mut config = config.clone();
        if let Some(entry) = self.refreshed_tokens.get(integration_id) {
            config.credentials.access_token =
                Some(crate::domain::integration::CredentialField::Literal(entry.0.clone()));
        }

        let ctx = HandlerContext {
            config: &config,
            probe_path,
            params,
            timeout,
        };

        let outcome = match self.handler.call(ctx).await {
            Ok(data) => RetryOutcome::Done(data),
            Err(Error::IntegrationAuthRejected(detail)) if attempt == 0 => {
                match self.try_refresh_token(integration_id, &config).await {
                    Ok(()) => RetryOutcome::Retryable(Error::IntegrationAuthRejected(detail)),
                    Err(_) => RetryOutcome::Fatal(Error::IntegrationAuthRejected(detail)),
                }
            }
            Err(err @ Error::IntegrationAuthRejected(_)) => RetryOutcome::Fatal(err),
            Err(err @ Error::Transport(_)) => RetryOutcome::Retryable(err),
            Err(err @ Error::Timeout(_)) => RetryOutcome::Retryable(err),
            Err(other) => {
                tracing::debug!(probe = %probe, error = %other, "integration probe attempt failed");
                RetryOutcome::Fatal(other)
            }
        };

        self.log_attempt(integration_id_for_log, probe, attempt, &outcome).await;
        outcome
    }

    /// Attempts an out-of-band OAuth2 refresh using the integration's
    /// `refresh_token`/`token_refresh_url`, caching the new access token
    /// for subsequent calls to the same integration (§4.4 "retry on 401
    /// when credentials are OAuth2 and a refresh token is present").
    async fn try_refresh_token(
        &self,
        integration_id: &str,
        config: &crate::domain::integration::IntegrationConfig,
    ) -> Result<()> {
        if config.credentials.auth_method != crate::domain::integration::CredentialAuthMethod::OAuth2 {
            return Err(Error::Integration(
                "credentials are not OAuth2; nothing to refresh".to_string(),
            ));
        }
        let refresh_token = literal_value(&config.credentials.refresh_token)
            .ok_or_else(|| Error::Integration("no refresh token available".to_string()))?;
        let refresh_url = config
            .credentials
            .token_refresh_url
            .clone()
            .ok_or_else(|| Error::Integration("no token refresh url configured".to_string()))?;

        let client = reqwest::Client::new();
        let response = client
            .post(&refresh_url)
            .json(&serde_json::json!({ "refresh_token": refresh_token, "grant_type": "refresh_token" }))
            .send()
            .await
            .map_err(|err| Error::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::IntegrationAuthRejected("token refresh rejected".to_string()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| Error::Integration(format!("malformed token refresh response: {err}")))?;
        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Integration("token refresh response missing access_token".to_string()))?;

        self.refreshed_tokens.insert(
            integration_id.to_string(),
            (access_token.to_string(), Utc::now()),
        );
        Ok(())
    }

    async fn find_integration(&self, pack_name: &str) -> Result<Integration> {
        let integrations = self.persistence.list_integrations().await?;
        integrations
            .into_iter()
            .find(|i| i.integration_type == pack_name)
            .ok_or_else(|| Error::Integration(format!("no integration configured for pack '{pack_name}'")))
    }

    async fn log_attempt(
        &self,
        integration_id: &IntegrationId,
        probe: &str,
        attempt: u32,
        outcome: &RetryOutcome<Value>,
    ) {
        let (outcome_label, error_name, cause_name) = match outcome {
            RetryOutcome::Done(_) => ("success".to_string(), None, None),
            RetryOutcome::Retryable(err) => {
                ("retryable_error".to_string(), Some(err.code().to_string()), Some(err.to_string()))
            }
            RetryOutcome::Fatal(err) => {
                ("error".to_string(), Some(err.code().to_string()), Some(err.to_string()))
            }
        };
        let event = IntegrationEvent {
            integration_id: integration_id.clone(),
            probe: probe.to_string(),
            attempt,
            outcome: outcome_label,
            error_name,
            cause_name,
            cause_code: None,
            occurred_at: Utc::now(),
        };
        if let Err(err) = self.persistence.append_integration_event(event).await {
            tracing::warn!(error = %err, "failed to record integration event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::integration::{
        CredentialAuthMethod, Credentials, IntegrationConfig, IntegrationStatus,
    };
    use crate::persistence::memory::MemoryPersistence;

    async fn seed(persistence: &MemoryPersistence, pack: &str) -> IntegrationId {
        let id = IntegrationId::new();
        persistence
            .put_integration(Integration {
                id: id.clone(),
                integration_type: pack.to_string(),
                name: format!("{pack} test"),
                config: IntegrationConfig {
                    endpoint_url: "https://example.invalid".to_string(),
                    headers: Default::default(),
                    tls_trust: true,
                    credentials: Credentials {
                        auth_method: CredentialAuthMethod::ApiKey,
                        api_key: Some(crate::domain::integration::CredentialField::Literal(
                            "test-key".to_string(),
                        )),
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
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        id
    }

    #[tokio::test]
    async fn missing_integration_fails_fast_without_retrying() {
        let persistence = Arc::new(MemoryPersistence::new());
        let executor = Executor::new(persistence);
        let err = executor
            .execute_probe("proxmox.cluster.status", Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Integration(_)));
    }

    #[tokio::test]
    async fn probe_without_pack_prefix_is_rejected() {
        let persistence = Arc::new(MemoryPersistence::new());
        let executor = Executor::new(persistence);
        let err = executor.execute_probe("no-dot-here", Value::Null).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn finds_the_configured_integration_for_a_pack() {
        let persistence = Arc::new(MemoryPersistence::new());
        seed(&persistence, "proxmox").await;
        let executor = Executor::new(persistence);
        // The real HTTP call will fail against an invalid host, but it
        // must get past integration lookup and Keeper resolution first.
        let err = executor
            .execute_probe("proxmox.cluster.status", Value::Null)
            .await
            .unwrap_err();
        assert!(!matches!(err, Error::Validation(_)));
    }
}
