//! Configuration management using Figment (spec §6 "Configuration").
//!
//! Layering, highest priority first:
//! 1. `SONDE_`-prefixed environment variables
//! 2. `./config.toml`
//! 3. `~/.config/sonde-hub/config.toml` (XDG)
//! 4. `/etc/sonde-hub/config.toml`
//! 5. Compiled-in defaults
//!
//!
//! Built on the same
//! `Figment::new().merge(Serialized::defaults).merge(Toml::file).merge(Env::prefixed)`
//! layering used throughout this crate's config loading.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::audit::AuditConfig;
use crate::auth::AuthConfig;
use crate::error::{Error, Result};
use crate::lockout::LockoutConfig;
use crate::session::SessionConfig;
use crate::websocket::WebSocketConfig;

/// Where `SONDE_SECRET` is sourced from. Key Vault resolution itself is
/// out of scope (§1); selecting it yields a typed, explicit error rather
/// than silently falling back to the raw env value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecretSource {
    #[default]
    Local,
    Keyvault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Top-level configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub service_name: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,

    /// Mandatory ≥16-char secret. Used to derive the integration-blob
    /// encryption key (§4.1, `crypto::encrypt`) and the session-cookie
    /// secret.
    pub secret: String,
    #[serde(default)]
    pub secret_source: SecretSource,

    #[serde(default)]
    pub db_path: String,

    /// Whether the listener speaks TLS at all. Certificate material itself
    /// lives in `tls`, which is only consulted when this is set.
    #[serde(default)]
    pub tls_enabled: bool,
    #[serde(default)]
    pub tls: Option<TlsConfig>,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub security_headers: SecurityHeadersConfig,

    pub hub_url: Option<String>,

    pub admin_user: Option<String>,
    pub admin_password: Option<String>,

    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_body_limit")]
    pub request_body_limit_bytes: usize,
    #[serde(default = "default_shutdown_timeout")]
    pub graceful_shutdown_timeout_secs: u64,

    /// Allow unsigned pack manifests (§3 "Pack"). Defaults to false in
    /// production-shaped configs; tests may flip it for fixture packs.
    #[serde(default)]
    pub allow_unsigned_packs: bool,

    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub lockout: LockoutConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_body_limit() -> usize {
    10 * 1024 * 1024
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Certificate material for the listener and the per-agent mTLS CA (§6).
///
/// The hub's own server cert (`cert_path`/`key_path`) authenticates it to
/// agents and dashboard browsers. `ca_cert_path`/`ca_key_path` point at the
/// hub-minted CA used to sign per-agent client certificates at enrollment
/// time (`tls::issue_agent_cert`); the server verifies incoming agent
/// connections against that same CA when `require_client_cert` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    #[serde(default = "default_ca_cert_path")]
    pub ca_cert_path: PathBuf,
    #[serde(default = "default_ca_key_path")]
    pub ca_key_path: PathBuf,
    #[serde(default = "default_true_bool")]
    pub require_client_cert: bool,
}

fn default_ca_cert_path() -> PathBuf {
    PathBuf::from("sonde-ca.pem")
}

fn default_ca_key_path() -> PathBuf {
    PathBuf::from("sonde-ca-key.pem")
}

fn default_true_bool() -> bool {
    true
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: PathBuf::from("sonde-cert.pem"),
            key_path: PathBuf::from("sonde-key.pem"),
            ca_cert_path: default_ca_cert_path(),
            ca_key_path: default_ca_key_path(),
            require_client_cert: true,
        }
    }
}

/// Per-route rate-limit override (§6, `middleware::route_matcher`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRateLimitConfig {
    pub requests_per_minute: u32,
    pub burst_size: u32,
    /// When true, the limit is keyed per caller identity rather than global
    /// to the route.
    #[serde(default = "default_true_bool")]
    pub per_user: bool,
}

/// HTTP rate-limiting configuration consumed by `middleware::governor`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_per_user_rpm")]
    pub per_user_rpm: u32,
    #[serde(default = "default_per_client_rpm")]
    pub per_client_rpm: u32,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default)]
    pub routes: HashMap<String, RouteRateLimitConfig>,
}

fn default_per_user_rpm() -> u32 {
    120
}

fn default_per_client_rpm() -> u32 {
    600
}

fn default_window_secs() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_user_rpm: default_per_user_rpm(),
            per_client_rpm: default_per_client_rpm(),
            window_secs: default_window_secs(),
            routes: HashMap::new(),
        }
    }
}

/// Response security headers applied to every route (`middleware::security_headers`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityHeadersConfig {
    #[serde(default = "default_true_bool")]
    pub enabled: bool,
    #[serde(default = "default_true_bool")]
    pub hsts: bool,
    #[serde(default = "default_hsts_max_age")]
    pub hsts_max_age_secs: u64,
    #[serde(default)]
    pub hsts_include_subdomains: bool,
    #[serde(default)]
    pub hsts_preload: bool,
    #[serde(default = "default_true_bool")]
    pub x_content_type_options: bool,
    #[serde(default = "default_x_frame_options")]
    pub x_frame_options: String,
    #[serde(default = "default_true_bool")]
    pub x_xss_protection: bool,
    #[serde(default = "default_referrer_policy")]
    pub referrer_policy: String,
    #[serde(default)]
    pub permissions_policy: Option<String>,
}

fn default_hsts_max_age() -> u64 {
    31_536_000
}

fn default_x_frame_options() -> String {
    "DENY".to_string()
}

fn default_referrer_policy() -> String {
    "no-referrer".to_string()
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hsts: true,
            hsts_max_age_secs: default_hsts_max_age(),
            hsts_include_subdomains: false,
            hsts_preload: false,
            x_content_type_options: true,
            x_frame_options: default_x_frame_options(),
            x_xss_protection: true,
            referrer_policy: default_referrer_policy(),
            permissions_policy: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "sonde-hub".to_string(),
            host: default_host(),
            port: default_port(),
            secret: String::new(),
            secret_source: SecretSource::default(),
            db_path: "sonde.db".to_string(),
            tls_enabled: false,
            tls: None,
            rate_limit: RateLimitConfig::default(),
            security_headers: SecurityHeadersConfig::default(),
            hub_url: None,
            admin_user: None,
            admin_password: None,
            log_format: LogFormat::default(),
            log_level: default_log_level(),
            request_body_limit_bytes: default_body_limit(),
            graceful_shutdown_timeout_secs: default_shutdown_timeout(),
            allow_unsigned_packs: false,
            audit: AuditConfig::default(),
            auth: AuthConfig::default(),
            websocket: WebSocketConfig::default(),
            session: SessionConfig::default(),
            lockout: LockoutConfig::default(),
        }
    }
}

impl Config {
    pub const ENV_PREFIX: &'static str = "SONDE_";
    pub const MIN_SECRET_LEN: usize = 16;

    /// Loads configuration from all layers and validates the result
    /// (§8 boundary properties: secret length, port range).
    pub fn load() -> Result<Self> {
        let config_paths = Self::find_config_paths("sonde-hub");

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        for path in config_paths.iter().rev() {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        // Legacy SONDE_API_KEY accepted in place of SONDE_SECRET, with a
        // deprecation warning, per §6.
        if std::env::var("SONDE_SECRET").is_err() {
            if let Ok(legacy) = std::env::var("SONDE_API_KEY") {
                tracing::warn!("SONDE_API_KEY is deprecated; set SONDE_SECRET instead");
                figment = figment.merge(("secret", legacy));
            }
        }

        figment = figment.merge(Env::prefixed(Self::ENV_PREFIX));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(Self::ENV_PREFIX))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.secret.len() < Self::MIN_SECRET_LEN {
            return Err(Error::Config(format!(
                "SONDE_SECRET must be at least {} characters",
                Self::MIN_SECRET_LEN
            )));
        }
        if self.port == 0 {
            return Err(Error::Config("PORT must be between 1 and 65535".to_string()));
        }
        if self.secret_source == SecretSource::Keyvault {
            return Err(Error::Config(
                "SONDE_SECRET_SOURCE=keyvault requires Azure Key Vault loading, which this binary \
                 does not implement (out of scope); resolve the secret externally and set \
                 SONDE_SECRET_SOURCE=local"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn find_config_paths(service_name: &str) -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix("sonde-hub");
        let config_file_path = Path::new(service_name).join("config.toml");
        if let Ok(path) = xdg_dirs.place_config_file(&config_file_path) {
            paths.push(path);
        }

        paths.push(PathBuf::from("/etc/sonde-hub").join(service_name).join("config.toml"));
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_secret_rejected() {
        let config = Config {
            secret: "short".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn sixteen_char_secret_accepted() {
        let config = Config {
            secret: "sixteen-chars!!!".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_port_rejected() {
        let config = Config {
            secret: "sixteen-chars!!!".to_string(),
            port: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn keyvault_source_without_support_is_explicit_error() {
        let config = Config {
            secret: "sixteen-chars!!!".to_string(),
            secret_source: SecretSource::Keyvault,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
