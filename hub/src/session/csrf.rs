//! Double-submit CSRF protection for the dashboard's cookie-session routes.
//!
//! The dashboard is a JSON API, not a form-posting site, so there is no
//! server-rendered page to embed a hidden `_csrf` field in. What still
//! applies is the classic cross-site risk: a browser automatically attaches
//! the `sonde_session` cookie to any request a malicious page triggers, so a
//! POST/PUT/DELETE/PATCH must prove the caller can also read the token this
//! middleware stashes in the session, which a cross-origin page cannot do.
//!
//! Flow: a session obtains one token (minted on first touch, cached for the
//! life of the session) via [`CsrfToken::ensure`], returns it to the client
//! in a response header, and the client echoes it back on every unsafe
//! request via [`CsrfConfig::header_name`]. [`CsrfConfig::form_field_name`]
//! is kept in config for parity with form-based deployments of this stack
//! even though nothing here reads it.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::{Error, Result};

use super::config::CsrfConfig;
use super::extractors::SessionData;
use tower_sessions::Session;

const SESSION_KEY: &str = "csrf_token";

/// A session-bound CSRF token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    fn generate(len: usize) -> Self {
        use rand::RngCore;
        let mut bytes = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(
            base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, &bytes),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the token already bound to `session`, minting and storing one
    /// if this is the session's first CSRF-protected request.
    pub async fn ensure(session: &Session, config: &CsrfConfig) -> Result<Self> {
        if let Some(existing) = session.get_value::<String>(SESSION_KEY).await? {
            return Ok(Self(existing));
        }
        let token = Self::generate(config.token_length);
        session.set_value(SESSION_KEY, &token.0).await?;
        Ok(token)
    }
}

/// Axum middleware enforcing the double-submit check on non-safe methods.
/// Registered with `middleware::from_fn_with_state(config, csrf_middleware)`
/// on the dashboard router, inside the session layer.
pub async fn csrf_middleware(
    State(config): State<CsrfConfig>,
    session: Session,
    request: Request,
    next: Next,
) -> Response {
    if !config.enabled || config.safe_methods.iter().any(|m| m == request.method().as_str()) {
        return next.run(request).await;
    }

    let expected = match CsrfToken::ensure(&session, &config).await {
        Ok(token) => token,
        Err(err) => return err.into_response(),
    };

    let presented = request
        .headers()
        .get(&config.header_name)
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(value) if value == expected.as_str() => next.run(request).await,
        _ => (
            StatusCode::FORBIDDEN,
            "missing or invalid CSRF token",
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_is_stable_across_calls() {
        let store = tower_sessions_memory_store::MemoryStore::default();
        let session = Session::new(None, std::sync::Arc::new(store), None);
        let config = CsrfConfig::default();
        let first = CsrfToken::ensure(&session, &config).await.unwrap();
        let second = CsrfToken::ensure(&session, &config).await.unwrap();
        assert_eq!(first, second);
    }
}
