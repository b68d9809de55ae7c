//! Dashboard login/logout handlers under `/auth/*` (spec §4.8 path 3,
//! §6 "Dashboard HTTP"). Two credential shapes reach these routes: the
//! single local admin from `config.admin_user`/`admin_password`, and
//! Entra SSO when `runtime.entra` is configured. Both end up as a
//! [`AuthSession`] stored in the `sonde_session` cookie, never as a
//! bearer token — that path belongs to [`crate::mcp::handler`] instead.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::auth::oauth::{OAuthProvider, OAuthStateManager, StateData};
use crate::auth::{AuthKind, Role};
use crate::error::{Error, Result};
use crate::session::{AuthSession, SessionAuth};
use crate::state::HubRuntime;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    username: String,
    password: String,
}

/// `POST /auth/login`: local-admin credential check against
/// `config.admin_user`/`admin_password`. Locked out after repeated
/// failures by [`crate::lockout::LoginLockout`].
pub async fn login(
    State(runtime): State<Arc<HubRuntime>>,
    mut session: SessionAuth,
    Json(request): Json<LoginRequest>,
) -> Result<Response> {
    let status = runtime.lockout.check(&request.username)?;
    if status.locked {
        return Err(Error::RateLimited);
    }

    let valid = match (&runtime.config.admin_user, &runtime.config.admin_password) {
        (Some(admin_user), Some(admin_password)) if *admin_user == request.username => {
            verify_admin_password(admin_password, &request.password)
        }
        _ => false,
    };

    if !valid {
        let status = runtime.lockout.record_failure(&request.username)?;
        if status.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(status.delay_ms)).await;
        }
        return Err(Error::Auth("invalid username or password".to_string()));
    }

    runtime.lockout.record_success(&request.username)?;

    session.data_mut().login(request.username.clone(), vec![Role::Owner.to_string()]);
    session.save().await?;
    session.session().cycle_id().await.map_err(|e| Error::Internal(format!("failed to cycle session id: {e}")))?;

    Ok(Json(json!({ "authenticated": true, "user": request.username, "role": Role::Owner })).into_response())
}

/// Compares a plaintext admin password against the configured value. A
/// value starting with the Argon2id marker is hashed; anything else is an
/// operator-supplied plaintext bootstrap password, compared directly.
fn verify_admin_password(configured: &str, presented: &str) -> bool {
    if configured.starts_with("$argon2") {
        crate::auth::PasswordHasher::default()
            .verify(presented, configured)
            .unwrap_or(false)
    } else {
        tracing::warn!("admin_password is not an Argon2id hash; comparing as plaintext");
        configured == presented
    }
}

/// `POST /auth/logout`: clears the dashboard session.
pub async fn logout(mut session: SessionAuth) -> Result<Response> {
    session.data_mut().logout();
    session.save().await?;
    Ok(Json(json!({ "authenticated": false })).into_response())
}

/// `GET /auth/entra/login`: redirects to Microsoft's authorize endpoint.
pub async fn entra_login(State(runtime): State<Arc<HubRuntime>>) -> Result<Response> {
    let entra = runtime
        .entra
        .as_ref()
        .ok_or_else(|| Error::Config("Entra SSO is not configured".to_string()))?;

    let state = runtime
        .oauth_state
        .create_state(&StateData {
            provider: "entra".to_string(),
            redirect_uri: None,
            created_at: chrono::Utc::now().timestamp(),
            extra: None,
        })
        .await?;

    Ok(Redirect::to(&entra.authorization_url(&state, &[])).into_response())
}

#[derive(Debug, Deserialize)]
pub struct EntraCallbackQuery {
    code: String,
    state: String,
}

/// `GET /auth/entra/callback`: exchanges the authorization code, resolves
/// the caller's group memberships, and establishes a dashboard session.
/// Admin-group members get [`Role::Admin`]; everyone else gets
/// [`Role::Member`] (§4.8.3's per-user authorized-row path is not wired
/// up yet — see DESIGN.md).
pub async fn entra_callback(
    State(runtime): State<Arc<HubRuntime>>,
    Query(query): Query<EntraCallbackQuery>,
    mut session: SessionAuth,
) -> Result<Response> {
    let entra = runtime
        .entra
        .as_ref()
        .ok_or_else(|| Error::Config("Entra SSO is not configured".to_string()))?;

    runtime.oauth_state.validate_state(&query.state).await?;

    let tokens = entra.exchange_code(&query.code).await?;
    let profile = entra.get_user_info(&tokens.access_token).await?;

    let group_ids: Vec<String> = profile
        .raw
        .get("groupIds")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let role = if entra.is_admin_group_member(&group_ids) {
        Role::Admin
    } else {
        Role::Member
    };

    let display_name = profile.name.clone().unwrap_or_else(|| profile.provider_user_id.clone());
    session.data_mut().login(profile.provider_user_id.clone(), vec![role.to_string()]);
    session.save().await?;

    tracing::info!(subject = %profile.provider_user_id, %role, kind = ?AuthKind::Session, "entra login established");

    Ok(Json(json!({ "authenticated": true, "user": display_name, "role": role })).into_response())
}

/// `GET /auth/session`: returns the caller's current dashboard session,
/// for the SPA to check on load.
pub async fn current_session(session: SessionAuth) -> Json<serde_json::Value> {
    let data: &AuthSession = session.data();
    Json(json!({
        "authenticated": data.is_authenticated(),
        "user": data.user_id(),
        "roles": data.roles,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::PasswordHasher;

    #[test]
    fn plaintext_admin_password_matches_exact_value() {
        assert!(verify_admin_password("correct-horse-battery", "correct-horse-battery"));
        assert!(!verify_admin_password("correct-horse-battery", "wrong"));
    }

    #[test]
    fn hashed_admin_password_verifies_through_argon2() {
        let hash = PasswordHasher::default().hash("correct-horse-battery").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_admin_password(&hash, "correct-horse-battery"));
        assert!(!verify_admin_password(&hash, "wrong-password"));
    }
}
