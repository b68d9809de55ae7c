//! Generic HTTP invocation for integration probes (spec §4.4).
//!
//! Every built-in integration pack (Proxmox, Check Point, ...) speaks
//! plain HTTP/JSON against a per-integration `endpoint_url`, so one
//! handler covers all of them: attach credentials per the integration's
//! auth method, call `<endpoint_url>/<probe-path>`, bound the whole
//! attempt by the probe's timeout, and hand the JSON body back untouched.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::integration::{CredentialAuthMethod, Credentials, IntegrationConfig};
use crate::error::{Error, Result};
use crate::integration::keeper::literal_value;

/// What a handler needs to make one call: the resolved config (already
/// past Keeper reference substitution) and the unqualified probe path,
/// e.g. `cluster.status` for pack `proxmox`.
pub struct HandlerContext<'a> {
    pub config: &'a IntegrationConfig,
    pub probe_path: &'a str,
    pub params: &'a Value,
    pub timeout: Duration,
}

/// A pluggable integration call. The built-in packs all go through
/// [`GenericHttpHandler`]; this trait exists so a future pack with a
/// non-HTTP wire format (e.g. a native Keeper Commander session) can
/// still be dispatched by the same executor.
#[async_trait]
pub trait IntegrationHandler: Send + Sync {
    async fn call(&self, ctx: HandlerContext<'_>) -> Result<Value>;
}

/// Calls `{endpoint_url}/{probe_path}` as a `POST` carrying `params` as
/// the JSON body, attaching credentials per [`CredentialAuthMethod`].
pub struct GenericHttpHandler {
    client: reqwest::Client,
}

impl GenericHttpHandler {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    fn apply_auth(
        &self,
        mut request: reqwest::RequestBuilder,
        credentials: &Credentials,
    ) -> Result<reqwest::RequestBuilder> {
        match credentials.auth_method {
            CredentialAuthMethod::ApiKey => {
                let key = literal_value(&credentials.api_key).ok_or_else(|| {
                    Error::Integration("integration credentials missing resolved api_key".to_string())
                })?;
                request = request.header("X-API-Key", key);
            }
            CredentialAuthMethod::BearerToken => {
                let token = literal_value(&credentials.bearer_token).ok_or_else(|| {
                    Error::Integration("integration credentials missing resolved bearer_token".to_string())
                })?;
                request = request.bearer_auth(token);
            }
            CredentialAuthMethod::OAuth2 => {
                let token = literal_value(&credentials.access_token).ok_or_else(|| {
                    Error::Integration("integration credentials missing resolved access_token".to_string())
                })?;
                request = request.bearer_auth(token);
            }
        }
        Ok(request)
    }
}

impl Default for GenericHttpHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IntegrationHandler for GenericHttpHandler {
    async fn call(&self, ctx: HandlerContext<'_>) -> Result<Value> {
        let url = format!(
            "{}/{}",
            ctx.config.endpoint_url.trim_end_matches('/'),
            ctx.probe_path.replace('.', "/")
        );

        let mut request = self.client.post(&url).json(ctx.params);
        for (name, value) in &ctx.config.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request = self.apply_auth(request, &ctx.config.credentials)?;

        let response = tokio::time::timeout(ctx.timeout, request.send())
            .await
            .map_err(|_| Error::Timeout(ctx.timeout))?
            .map_err(|err| Error::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(integration_error_for_status(status, body));
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| Error::Integration(format!("malformed response body: {err}")))
    }
}

/// Maps an HTTP status into the error the retry loop classifies: 5xx is
/// retryable (`Error::Transport`), 401 triggers a refresh-and-retry on
/// the first attempt (`Error::IntegrationAuthRejected`), other 4xx are
/// fatal (`Error::Integration`).
fn integration_error_for_status(status: reqwest::StatusCode, body: String) -> Error {
    if status.is_server_error() {
        Error::Transport(format!("integration endpoint returned {status}: {body}"))
    } else if status == reqwest::StatusCode::UNAUTHORIZED {
        Error::IntegrationAuthRejected(body)
    } else {
        Error::Integration(format!("integration endpoint returned {status}: {body}"))
    }
}
