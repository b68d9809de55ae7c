//! Entra ID (Azure AD) SSO provider for dashboard login (§4.8.3).
//!
//! A generic OIDC authorization-code client pointed at Microsoft's
//! well-known endpoint, same shape as the teacher's `CustomOidcProvider`
//! but narrowed to the one provider this hub actually federates with.

use async_trait::async_trait;
use oauth2::{
    basic::BasicErrorResponse, AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret,
    CsrfToken, EmptyExtraTokenFields, RedirectUrl, Scope, StandardRevocableToken,
    StandardTokenIntrospectionResponse, StandardTokenResponse, TokenResponse, TokenUrl,
};
use reqwest::Client as HttpClient;

use super::provider::{OAuthProvider, OAuthTokens, OAuthUserInfo};
use crate::error::Error;

type ConfiguredClient = Client<
    BasicErrorResponse,
    StandardTokenResponse<EmptyExtraTokenFields, oauth2::basic::BasicTokenType>,
    StandardTokenIntrospectionResponse<EmptyExtraTokenFields, oauth2::basic::BasicTokenType>,
    StandardRevocableToken,
    BasicErrorResponse,
    oauth2::EndpointSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointSet,
>;

/// Configuration read from `SONDE_ENTRA_*` env vars (§6).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct EntraConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    /// Entra group object id mapped to the elevated role (§4.8.3 "dual
    /// authorization: individual user row *or* membership in an Entra
    /// group mapped to a role").
    pub admin_group_id: Option<String>,
}

#[derive(Clone)]
pub struct EntraProvider {
    client: ConfiguredClient,
    http_client: HttpClient,
    admin_group_id: Option<String>,
}

impl EntraProvider {
    pub fn new(config: EntraConfig) -> Result<Self, Error> {
        let auth_url = AuthUrl::new(format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/authorize",
            config.tenant_id
        ))
        .map_err(|e| Error::Config(format!("invalid Entra authorize URL: {e}")))?;
        let token_url = TokenUrl::new(format!(
            "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
            config.tenant_id
        ))
        .map_err(|e| Error::Config(format!("invalid Entra token URL: {e}")))?;

        let client = Client::new(ClientId::new(config.client_id))
            .set_client_secret(ClientSecret::new(config.client_secret))
            .set_auth_uri(auth_url)
            .set_token_uri(token_url)
            .set_redirect_uri(
                RedirectUrl::new(config.redirect_uri)
                    .map_err(|e| Error::Config(format!("invalid Entra redirect URI: {e}")))?,
            );

        let http_client = HttpClient::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::Internal(format!("failed to build Entra HTTP client: {e}")))?;

        Ok(Self {
            client,
            http_client,
            admin_group_id: config.admin_group_id,
        })
    }

    /// Whether the caller's group memberships include the mapped admin
    /// group (§4.8.3's "membership in an Entra group mapped to a role").
    pub fn is_admin_group_member(&self, group_ids: &[String]) -> bool {
        match &self.admin_group_id {
            Some(admin_group) => group_ids.iter().any(|g| g == admin_group),
            None => false,
        }
    }
}

#[async_trait]
impl OAuthProvider for EntraProvider {
    fn name(&self) -> &str {
        "entra"
    }

    fn authorization_url(&self, state: &str, additional_scopes: &[String]) -> String {
        let mut scopes: Vec<Scope> = vec![
            Scope::new("openid".to_string()),
            Scope::new("email".to_string()),
            Scope::new("profile".to_string()),
            Scope::new("GroupMember.Read.All".to_string()),
        ];
        for scope in additional_scopes {
            scopes.push(Scope::new(scope.clone()));
        }

        let mut auth_request = self.client.authorize_url(|| CsrfToken::new(state.to_string()));
        for scope in scopes {
            auth_request = auth_request.add_scope(scope);
        }
        let (url, _) = auth_request.url();
        url.to_string()
    }

    async fn exchange_code(&self, code: &str) -> Result<OAuthTokens, Error> {
        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| Error::Auth(format!("Entra token exchange failed: {e}")))?;

        Ok(OAuthTokens {
            access_token: token_result.access_token().secret().clone(),
            refresh_token: token_result.refresh_token().map(|t| t.secret().clone()),
            expires_in: token_result.expires_in().map(|d| d.as_secs() as i64),
            token_type: "Bearer".to_string(),
            id_token: None,
        })
    }

    async fn get_user_info(&self, access_token: &str) -> Result<OAuthUserInfo, Error> {
        let response = self
            .http_client
            .get("https://graph.microsoft.com/v1.0/me")
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::Auth(format!("Entra profile fetch failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!("Entra profile fetch rejected: {status} {body}")));
        }

        let profile: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::Auth(format!("malformed Entra profile response: {e}")))?;

        let sub = profile["id"]
            .as_str()
            .ok_or_else(|| Error::Auth("Entra profile missing id claim".to_string()))?;

        Ok(OAuthUserInfo {
            provider: "entra".to_string(),
            provider_user_id: sub.to_string(),
            email: profile["mail"]
                .as_str()
                .or(profile["userPrincipalName"].as_str())
                .map(str::to_string),
            email_verified: true,
            name: profile["displayName"].as_str().map(str::to_string),
            picture: None,
            raw: profile,
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<OAuthTokens, Error> {
        let token_result = self
            .client
            .exchange_refresh_token(&oauth2::RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| Error::Auth(format!("Entra token refresh failed: {e}")))?;

        Ok(OAuthTokens {
            access_token: token_result.access_token().secret().clone(),
            refresh_token: token_result.refresh_token().map(|t| t.secret().clone()),
            expires_in: token_result.expires_in().map(|d| d.as_secs() as i64),
            token_type: "Bearer".to_string(),
            id_token: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EntraConfig {
        EntraConfig {
            tenant_id: "tenant-123".to_string(),
            client_id: "client-abc".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "https://hub.example.com/auth/entra/callback".to_string(),
            admin_group_id: Some("group-admins".to_string()),
        }
    }

    #[test]
    fn authorization_url_points_at_the_right_tenant() {
        let provider = EntraProvider::new(config()).unwrap();
        let url = provider.authorization_url("state-value", &[]);
        assert!(url.contains("login.microsoftonline.com/tenant-123"));
        assert!(url.contains("state=state-value"));
    }

    #[test]
    fn admin_group_membership_is_detected() {
        let provider = EntraProvider::new(config()).unwrap();
        assert!(provider.is_admin_group_member(&["group-admins".to_string()]));
        assert!(!provider.is_admin_group_member(&["group-members".to_string()]));
    }
}
