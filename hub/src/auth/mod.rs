//! Authentication and authorization primitives
//!
//! Three credential shapes reach this module: opaque API keys carried by
//! agents and MCP clients, OAuth2 access tokens issued by the built-in PKCE
//! authorization server, and dashboard cookie sessions backed by either a
//! local admin password or Entra SSO. All three resolve to the same
//! [`AuthContext`], which is what the policy evaluator and route handlers
//! actually consume.

pub mod api_keys;
pub mod config;
pub mod oauth;
pub mod password;
pub mod routes;

pub use config::AuthConfig;
pub use password::PasswordHasher;

use serde::{Deserialize, Serialize};

use crate::domain::api_key::ApiKeyPolicy;
use crate::error::{Error, Result};
use crate::persistence::PersistencePort;

/// Role hierarchy: `member` ⊂ `admin` ⊂ `owner`.
///
/// Each role implies every capability of the roles below it; there is no
/// separate permission list to keep in sync with the hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
    Owner,
}

impl Role {
    /// Whether this role satisfies a required minimum role.
    pub fn satisfies(&self, required: Role) -> bool {
        *self >= required
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Member => write!(f, "member"),
            Role::Admin => write!(f, "admin"),
            Role::Owner => write!(f, "owner"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Role::Member),
            "admin" => Ok(Role::Admin),
            "owner" => Ok(Role::Owner),
            other => Err(crate::error::Error::Validation(format!(
                "unknown role: {other}"
            ))),
        }
    }
}

/// The source a request's identity was established through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthKind {
    ApiKey,
    OAuth,
    Session,
}

/// The resolved identity and authority of the caller behind a request.
///
/// Inserted into request extensions by whichever auth middleware handled
/// the credential (API key, OAuth bearer token, or cookie session), and
/// read back out by the policy evaluator, audit middleware, and handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthContext {
    /// How this identity was established.
    pub kind: AuthKind,
    /// Stable identifier for the caller (API key id, OAuth subject, or
    /// session-bound admin user id) — what gets written to the audit log.
    pub subject: String,
    /// Display name, for UI/logging purposes.
    pub display_name: String,
    /// Effective role.
    pub role: Role,
    /// The restrictions `policy::evaluate_agent_access` /
    /// `evaluate_probe_access` check against. API-key identities carry
    /// whatever the stored [`ApiKeyRecord`](crate::domain::api_key::ApiKeyRecord)
    /// says; OAuth and dashboard sessions get `ApiKeyPolicy::default()`,
    /// which is unrestricted beyond role (§4.2: "an empty policy means
    /// allow all").
    pub policy: ApiKeyPolicy,
    /// OAuth scopes granted to the bearer token, if this identity came
    /// through the MCP PKCE authorization server. Empty for API-key and
    /// session identities.
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl AuthContext {
    pub fn has_role(&self, required: Role) -> bool {
        self.role.satisfies(required)
    }

    /// Convenience for a dashboard/session identity with no probe-level
    /// restriction of its own, only its role.
    pub fn unrestricted(kind: AuthKind, subject: String, display_name: String, role: Role) -> Self {
        Self {
            kind,
            subject,
            display_name,
            role,
            policy: ApiKeyPolicy::default(),
            scopes: Vec::new(),
        }
    }
}

/// Resolves a bearer credential to an [`AuthContext`] by trying, in order,
/// the API-key store and the MCP PKCE authorization server (§4.8 paths 1
/// and 2). Cookie sessions are a separate, dashboard-only path handled by
/// the session middleware rather than this function.
pub async fn resolve_bearer_auth(
    persistence: &dyn PersistencePort,
    mcp_auth: &oauth::McpAuthorizationServer,
    bearer: &str,
) -> Result<AuthContext> {
    match api_keys::authenticate(persistence, bearer).await {
        Ok(record) => Ok(AuthContext {
            kind: AuthKind::ApiKey,
            subject: record.id.to_string(),
            display_name: record.display_name,
            role: record.role,
            policy: record.policy,
            scopes: Vec::new(),
        }),
        Err(_) => match mcp_auth.validate_access_token(bearer) {
            Some(validated) => Ok(AuthContext {
                kind: AuthKind::OAuth,
                subject: validated.client_id.clone(),
                display_name: validated.client_id,
                role: Role::Member,
                policy: ApiKeyPolicy::default(),
                scopes: validated.scopes,
            }),
            None => Err(Error::Auth("invalid or unrecognised bearer credential".to_string())),
        },
    }
}
