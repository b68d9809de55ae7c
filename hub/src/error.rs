//! Error types and response conversion (spec §7).
//!
//! Every kind the core distinguishes is a variant here. HTTP-edge errors
//! convert via `IntoResponse`; MCP-edge errors convert via
//! [`Error::as_mcp_result`]. `Internal` never leaks its inner `Display`
//! text to a caller in either surface — only a generic message plus the
//! request id that was already logged server-side.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error kinds distinguished by spec §7's surfacing table.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Missing/invalid/expired/revoked API key, or an unrecognised OAuth
    /// bearer token. Surfaces as HTTP 401; never audited.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// An agent or probe denied by policy (§4.2). Surfaces as an MCP tool
    /// result with `isError:true`; never audited.
    #[error("access denied: {0}")]
    PolicyDenied(String),

    /// Malformed tool input, unknown probe, or unknown runbook category.
    #[error("validation error: {0}")]
    Validation(String),

    /// Agent offline or unknown. Carries the last-seen hint verbatim so
    /// callers can surface it without the core leaking internal state.
    #[error("agent '{agent}' is {state}")]
    AgentUnavailable { agent: String, state: String },

    /// WebSocket write failed mid-probe. Surfaces as `status:'error'`,
    /// audited.
    #[error("transport error: {0}")]
    Transport(String),

    /// Probe exceeded its declared timeout. Surfaces as
    /// `status:'timeout'`, audited.
    #[error("probe timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// 4xx after retries, or a handler exception, from an integration
    /// call. Surfaces as `status:'error'`, audited, with an
    /// `integration_events` row.
    #[error("integration error: {0}")]
    Integration(String),

    /// The remote integration endpoint itself rejected the call with a
    /// 401 (distinct from [`Error::Auth`], which is this hub rejecting
    /// the caller). Retried once after an OAuth2 token refresh (§4.4);
    /// audited like any other integration failure.
    #[error("integration endpoint rejected credentials: {0}")]
    IntegrationAuthRejected(String),

    /// Config load failure (§8 boundary properties).
    #[error("configuration error: {0}")]
    Config(String),

    /// Resource not found (dashboard/API surface).
    #[error("not found: {0}")]
    NotFound(String),

    /// Login rate limit exceeded (§8 boundary property).
    #[error("rate limit exceeded, try again later")]
    RateLimited,

    /// Anything that must never leak to a caller: decrypt failure, schema
    /// violation, storage corruption. HTTP 500 at the edge; logged with
    /// the request id, but `Display`/`into_response`/`as_mcp_result`
    /// never repeat the inner string back to the caller.
    #[error("internal error")]
    Internal(String),
}

impl Error {
    /// A stable machine-readable code, used in both HTTP and MCP error
    /// bodies so client tooling can branch without parsing prose.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Auth(_) => "AUTH",
            Error::PolicyDenied(_) => "POLICY_DENIED",
            Error::Validation(_) => "VALIDATION",
            Error::AgentUnavailable { .. } => "AGENT_UNAVAILABLE",
            Error::Transport(_) => "TRANSPORT",
            Error::Timeout(_) => "TIMEOUT",
            Error::Integration(_) => "INTEGRATION",
            Error::IntegrationAuthRejected(_) => "INTEGRATION_AUTH_REJECTED",
            Error::Config(_) => "CONFIG",
            Error::NotFound(_) => "NOT_FOUND",
            Error::RateLimited => "RATE_LIMITED",
            Error::Internal(_) => "INTERNAL",
        }
    }

    /// Whether a probe call resulting in this error should still produce
    /// an audit row (§7: everything except Auth/PolicyDenied/Validation/
    /// AgentUnavailable is audited).
    pub fn is_audited(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::Timeout(_)
                | Error::Integration(_)
                | Error::IntegrationAuthRejected(_)
                | Error::Internal(_)
        )
    }

    /// Renders this error as MCP tool-result text (§7). `Internal` never
    /// echoes its inner detail.
    pub fn as_mcp_message(&self) -> String {
        match self {
            Error::Internal(_) => "internal error, see server logs for this request".to_string(),
            other => other.to_string(),
        }
    }
}

/// JSON body returned by HTTP-edge errors.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub status: u16,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, code: &str, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.to_string(),
            status: status.as_u16(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::PolicyDenied(_) => StatusCode::FORBIDDEN,
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::AgentUnavailable { .. } => StatusCode::CONFLICT,
            Error::Transport(_) => StatusCode::BAD_GATEWAY,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::Integration(_) => StatusCode::BAD_GATEWAY,
            Error::IntegrationAuthRejected(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Error::Internal(ref detail) => {
                tracing::error!(error = %detail, "internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let message = match &self {
            Error::Internal(_) => "internal server error".to_string(),
            other => other.to_string(),
        };

        let body = ErrorResponse::new(status, self.code(), message);
        (status, Json(body)).into_response()
    }
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Internal(format!("I/O error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_error_does_not_leak_detail_via_display() {
        let err = Error::Internal("decrypt failed for row intg_abc123".to_string());
        let msg = err.as_mcp_message();
        assert!(!msg.contains("intg_abc123"));
    }

    #[test]
    fn internal_error_response_body_omits_detail() {
        let err = Error::Internal("super secret internal detail".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn audited_kinds_match_spec_table() {
        assert!(Error::Timeout(std::time::Duration::from_secs(1)).is_audited());
        assert!(Error::Transport("write failed".into()).is_audited());
        assert!(!Error::Auth("missing key".into()).is_audited());
        assert!(!Error::PolicyDenied("nope".into()).is_audited());
    }

    #[test]
    fn non_internal_display_is_safe_to_return_verbatim() {
        let err = Error::PolicyDenied("agent 'srv2' is not in the allowed-agents list".into());
        assert_eq!(err.as_mcp_message(), err.to_string());
    }
}
