//! Authentication configuration structures
//!
//! Configuration for dashboard password hashing, API keys, and OAuth2.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::oauth::EntraConfig;

/// Main authentication configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Password hashing configuration (dashboard local-admin login only)
    #[serde(default)]
    pub password: PasswordConfig,

    /// API key configuration (agent + MCP bearer auth)
    #[serde(default)]
    pub api_keys: ApiKeyConfig,

    /// OAuth2 configuration (MCP PKCE authorization server + Entra SSO)
    #[serde(default)]
    pub oauth: OAuthConfig,
}

/// Password hashing configuration following OWASP guidelines
///
/// Default values are based on OWASP recommendations for Argon2id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordConfig {
    /// Memory cost in KiB (default: 65536 = 64 MiB)
    #[serde(default = "default_memory_cost")]
    pub memory_cost_kib: u32,

    /// Time cost / iterations (default: 3)
    #[serde(default = "default_time_cost")]
    pub time_cost: u32,

    /// Parallelism degree (default: 4)
    #[serde(default = "default_parallelism")]
    pub parallelism: u32,

    /// Minimum password length (default: 8)
    #[serde(default = "default_min_length")]
    pub min_password_length: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost_kib: default_memory_cost(),
            time_cost: default_time_cost(),
            parallelism: default_parallelism(),
            min_password_length: default_min_length(),
        }
    }
}

/// API key configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyConfig {
    /// Key prefix (e.g. "sonde")
    #[serde(default = "default_api_key_prefix")]
    pub prefix: String,

    /// Header name for API key (default: "Authorization", bearer scheme)
    #[serde(default = "default_api_key_header")]
    pub header: String,
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            prefix: default_api_key_prefix(),
            header: default_api_key_header(),
        }
    }
}

/// OAuth2 configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// Enable the MCP PKCE authorization server (default: true)
    #[serde(default = "default_true")]
    pub mcp_pkce_enabled: bool,

    /// Authorization code TTL in seconds (default: 300 = 5 min)
    #[serde(default = "default_auth_code_ttl")]
    pub auth_code_ttl_secs: u64,

    /// Access token TTL in seconds (default: 3600 = 1 hr). No refresh tokens are issued.
    #[serde(default = "default_token_ttl")]
    pub access_token_ttl_secs: u64,

    /// Entra SSO provider for dashboard login, if configured
    #[serde(default)]
    pub entra: Option<EntraConfig>,

    /// Additional named providers (reserved for future use)
    #[serde(default)]
    pub providers: HashMap<String, OAuthProviderConfig>,
}

/// Generic OAuth2/OIDC provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub authorization_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
}

fn default_memory_cost() -> u32 {
    65536
}

fn default_time_cost() -> u32 {
    3
}

fn default_parallelism() -> u32 {
    4
}

fn default_min_length() -> usize {
    8
}

fn default_true() -> bool {
    true
}

fn default_api_key_prefix() -> String {
    "sonde".to_string()
}

fn default_api_key_header() -> String {
    "Authorization".to_string()
}

fn default_auth_code_ttl() -> u64 {
    300
}

fn default_token_ttl() -> u64 {
    3600
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_config_defaults() {
        let config = PasswordConfig::default();
        assert_eq!(config.memory_cost_kib, 65536);
        assert_eq!(config.time_cost, 3);
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.min_password_length, 8);
    }

    #[test]
    fn test_api_key_config_defaults() {
        let config = ApiKeyConfig::default();
        assert_eq!(config.prefix, "sonde");
        assert_eq!(config.header, "Authorization");
    }

    #[test]
    fn test_oauth_config_defaults() {
        let config = OAuthConfig::default();
        assert!(config.mcp_pkce_enabled);
        assert_eq!(config.auth_code_ttl_secs, 300);
        assert_eq!(config.access_token_ttl_secs, 3600);
        assert!(config.entra.is_none());
    }
}
