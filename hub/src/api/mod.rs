//! Dashboard REST surface under `/api/v1/*` (spec §6 "Dashboard HTTP").
//!
//! Every route here runs behind [`require_auth`], which accepts either a
//! bearer credential (API key or MCP OAuth token, same resolution as
//! [`crate::mcp::handler`]) or the `sonde_session` cookie established by
//! [`crate::auth::routes`]. The resolved [`AuthContext`] lands in request
//! extensions for [`crate::middleware::GovernorRateLimit`] and individual
//! handlers to read back.

use std::sync::Arc;

use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get};
use axum::Router;
use serde::Deserialize;
use serde_json::json;

use crate::auth::{self, AuthContext, AuthKind, Role};
use crate::domain::api_key::ApiKeyPolicy;
use crate::error::{Error, Result};
use crate::ids::{AgentId, ApiKeyId};
use crate::session::SessionData;
use crate::state::HubRuntime;

/// Resolves the caller's identity from an `Authorization: Bearer` header
/// first, falling back to the dashboard session cookie, and rejects the
/// request with 401 if neither is present or valid.
pub async fn require_auth(
    State(runtime): State<Arc<HubRuntime>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let context = if let Some(bearer) = bearer {
        auth::resolve_bearer_auth(runtime.persistence.as_ref(), runtime.mcp_auth.as_ref(), bearer).await?
    } else {
        let session = request
            .extensions()
            .get::<tower_sessions::Session>()
            .cloned()
            .ok_or_else(|| Error::Auth("missing credentials".to_string()))?;
        // Mirrors `TypedSession`'s private storage key; there is no public
        // accessor for it outside the extractor itself.
        let auth_session: Option<crate::session::AuthSession> = session.get_value("_typed_session_data").await?;
        let auth_session = auth_session.filter(|s| s.is_authenticated()).ok_or_else(|| Error::Auth("missing credentials".to_string()))?;
        let role = auth_session
            .roles
            .first()
            .and_then(|r| r.parse::<Role>().ok())
            .unwrap_or(Role::Member);
        AuthContext::unrestricted(
            AuthKind::Session,
            auth_session.user_id().unwrap_or_default().to_string(),
            auth_session.user_id().unwrap_or_default().to_string(),
            role,
        )
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

fn require_role(context: &AuthContext, required: Role) -> Result<()> {
    if context.has_role(required) {
        Ok(())
    } else {
        Err(Error::PolicyDenied(format!("role '{required}' or higher is required")))
    }
}

async fn list_agents(State(runtime): State<Arc<HubRuntime>>) -> Result<Json<serde_json::Value>> {
    let agents = runtime.persistence.list_agents().await?;
    let connected = runtime.registry.connected_count();
    Ok(Json(json!({ "agents": agents, "connected": connected })))
}

async fn get_agent(State(runtime): State<Arc<HubRuntime>>, Path(id): Path<String>) -> Result<Json<serde_json::Value>> {
    let id: AgentId = id.parse().map_err(|_| Error::Validation("malformed agent id".to_string()))?;
    let agent = runtime
        .persistence
        .get_agent(&id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("agent '{id}'")))?;
    let online = runtime.registry.handle_for(&id).map(|h| h.is_online()).unwrap_or(false);
    Ok(Json(json!({ "agent": agent, "online": online })))
}

async fn list_integrations(State(runtime): State<Arc<HubRuntime>>) -> Result<Json<serde_json::Value>> {
    let integrations = runtime.persistence.list_integrations().await?;
    Ok(Json(json!({ "integrations": integrations })))
}

async fn list_critical_paths(State(runtime): State<Arc<HubRuntime>>) -> Result<Json<serde_json::Value>> {
    let paths = runtime.persistence.list_critical_paths().await?;
    Ok(Json(json!({ "critical_paths": paths })))
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    #[serde(default = "default_audit_limit")]
    limit: usize,
}

fn default_audit_limit() -> usize {
    100
}

async fn list_audit(
    axum::Extension(context): axum::Extension<AuthContext>,
    State(runtime): State<Arc<HubRuntime>>,
    axum::extract::Query(query): axum::extract::Query<AuditQuery>,
) -> Result<Json<serde_json::Value>> {
    require_role(&context, Role::Admin)?;
    let events = runtime.persistence.list_audit(query.limit).await?;
    Ok(Json(json!({ "audit": events })))
}

#[derive(Debug, Deserialize)]
struct CreateApiKeyRequest {
    display_name: String,
    #[serde(default = "default_role")]
    role: Role,
    #[serde(default)]
    policy: ApiKeyPolicy,
    #[serde(default)]
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_role() -> Role {
    Role::Member
}

async fn list_api_keys(
    axum::Extension(context): axum::Extension<AuthContext>,
    State(runtime): State<Arc<HubRuntime>>,
) -> Result<Json<serde_json::Value>> {
    require_role(&context, Role::Admin)?;
    let keys = runtime.persistence.list_api_keys().await?;
    Ok(Json(json!({ "api_keys": keys })))
}

async fn create_api_key(
    axum::Extension(context): axum::Extension<AuthContext>,
    State(runtime): State<Arc<HubRuntime>>,
    Json(request): Json<CreateApiKeyRequest>,
) -> Result<Response> {
    require_role(&context, Role::Admin)?;
    let generated = auth::api_keys::create(
        runtime.persistence.as_ref(),
        request.display_name,
        request.role,
        request.policy,
        context.subject.clone(),
        request.expires_at,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(json!({ "api_key": generated.raw_key, "record": generated.record }))).into_response())
}

async fn revoke_api_key(
    axum::Extension(context): axum::Extension<AuthContext>,
    State(runtime): State<Arc<HubRuntime>>,
    Path(id): Path<String>,
) -> Result<Response> {
    require_role(&context, Role::Admin)?;
    let id: ApiKeyId = id.parse().map_err(|_| Error::Validation("malformed api key id".to_string()))?;
    auth::api_keys::revoke(runtime.persistence.as_ref(), &id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn list_packs(State(runtime): State<Arc<HubRuntime>>) -> Json<serde_json::Value> {
    Json(json!({ "packs": runtime.catalog.list() }))
}

/// Builds the `/api/v1` router, unmounted — the caller (`server::build_router`)
/// nests it under the auth middleware and the shared `HubRuntime` state.
pub fn router() -> Router<Arc<HubRuntime>> {
    Router::new()
        .route("/agents", get(list_agents))
        .route("/agents/{id}", get(get_agent))
        .route("/integrations", get(list_integrations))
        .route("/critical-paths", get(list_critical_paths))
        .route("/packs", get(list_packs))
        .route("/audit", get(list_audit))
        .route("/api-keys", get(list_api_keys).post(create_api_key))
        .route("/api-keys/{id}", delete(revoke_api_key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::domain::agent::Agent;
    use crate::state::HubRuntime;

    async fn test_runtime() -> Arc<HubRuntime> {
        let config = Config {
            secret: "sixteen-chars!!!".to_string(),
            db_path: ":memory:".to_string(),
            ..Config::default()
        };
        Arc::new(HubRuntime::new(config).await.unwrap())
    }

    #[test]
    fn require_role_accepts_equal_or_higher() {
        let admin = AuthContext::unrestricted(AuthKind::Session, "a".into(), "a".into(), Role::Admin);
        assert!(require_role(&admin, Role::Member).is_ok());
        assert!(require_role(&admin, Role::Admin).is_ok());
    }

    #[test]
    fn require_role_rejects_lower_role() {
        let member = AuthContext::unrestricted(AuthKind::Session, "m".into(), "m".into(), Role::Member);
        let err = require_role(&member, Role::Admin).unwrap_err();
        assert!(matches!(err, Error::PolicyDenied(_)));
    }

    #[tokio::test]
    async fn list_agents_reflects_persisted_state() {
        let runtime = test_runtime().await;
        let agent = Agent::new("srv1".to_string(), "linux".to_string(), "1.0.0".to_string(), Vec::new());
        runtime.persistence.put_agent(agent).await.unwrap();

        let Json(body) = list_agents(State(runtime)).await.unwrap();
        assert_eq!(body["agents"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_agent_rejects_malformed_id() {
        let runtime = test_runtime().await;
        let err = get_agent(State(runtime), Path("not-an-id".to_string())).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn get_agent_404s_for_unknown_id() {
        let runtime = test_runtime().await;
        let id = crate::ids::AgentId::new();
        let err = get_agent(State(runtime), Path(id.to_string())).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn create_api_key_is_admin_gated() {
        let runtime = test_runtime().await;
        let member = AuthContext::unrestricted(AuthKind::Session, "m".into(), "m".into(), Role::Member);
        let request = CreateApiKeyRequest {
            display_name: "ci-runner".to_string(),
            role: Role::Member,
            policy: ApiKeyPolicy::default(),
            expires_at: None,
        };
        let err = create_api_key(axum::Extension(member), State(runtime), Json(request))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PolicyDenied(_)));
    }

    #[tokio::test]
    async fn admin_can_create_and_list_api_keys() {
        let runtime = test_runtime().await;
        let admin = AuthContext::unrestricted(AuthKind::Session, "owner".into(), "owner".into(), Role::Admin);
        let request = CreateApiKeyRequest {
            display_name: "ci-runner".to_string(),
            role: Role::Member,
            policy: ApiKeyPolicy::default(),
            expires_at: None,
        };
        create_api_key(axum::Extension(admin.clone()), State(runtime.clone()), Json(request))
            .await
            .unwrap();

        let Json(body) = list_api_keys(axum::Extension(admin), State(runtime)).await.unwrap();
        assert_eq!(body["api_keys"].as_array().unwrap().len(), 1);
    }
}
