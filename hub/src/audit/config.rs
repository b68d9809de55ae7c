//! Audit logging configuration
//!
//! Loaded from the `[audit]` section of config.toml or `SONDE_AUDIT_*` env vars.

use serde::{Deserialize, Serialize};

/// Audit logging configuration
///
/// Controls which events are captured and which routes are audited. The
/// hash-chained append-only event log itself always records every probe
/// dispatch, auth decision, and runbook step (non-negotiable per the
/// persistence port); this config only governs the *generic HTTP request*
/// audit middleware layered on top of that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Enable audit logging (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Audit all HTTP requests (default: false)
    ///
    /// When false, only requests matching `audited_routes` patterns are audited.
    /// Auth events are always audited when `audit_auth_events` is true.
    #[serde(default)]
    pub audit_all_requests: bool,

    /// Automatically emit audit events for auth operations (default: true)
    #[serde(default = "default_true")]
    pub audit_auth_events: bool,

    /// Glob patterns for routes that should be audited
    ///
    /// Examples: `["/api/v1/integrations/*", "/api/v1/agents/*/revoke"]`
    #[serde(default)]
    pub audited_routes: Vec<String>,

    /// Routes to exclude from auditing (default: ["/health", "/ready", "/metrics"])
    #[serde(default = "default_excluded_routes")]
    pub excluded_routes: Vec<String>,

    /// Days to retain audit events (None = infinite)
    #[serde(default)]
    pub retention_days: Option<u32>,

    /// Hours between cleanup runs (default: 24)
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_hours: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            audit_all_requests: false,
            audit_auth_events: true,
            audited_routes: Vec::new(),
            excluded_routes: default_excluded_routes(),
            retention_days: None,
            cleanup_interval_hours: default_cleanup_interval(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_excluded_routes() -> Vec<String> {
    vec![
        "/health".to_string(),
        "/ready".to_string(),
    ]
}

fn default_cleanup_interval() -> u32 {
    24
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_config_defaults() {
        let config = AuditConfig::default();
        assert!(config.enabled);
        assert!(!config.audit_all_requests);
        assert!(config.audit_auth_events);
        assert!(config.audited_routes.is_empty());
        assert_eq!(config.excluded_routes, vec!["/health", "/ready"]);
        assert!(config.retention_days.is_none());
        assert_eq!(config.cleanup_interval_hours, 24);
    }

    #[test]
    fn test_audit_config_serde_roundtrip() {
        let config = AuditConfig {
            enabled: true,
            audit_all_requests: true,
            audit_auth_events: false,
            audited_routes: vec!["/api/v1/integrations/*".to_string()],
            excluded_routes: vec!["/health".to_string()],
            retention_days: Some(90),
            cleanup_interval_hours: 12,
        };

        let json = serde_json::to_string(&config).unwrap();
        let deserialized: AuditConfig = serde_json::from_str(&json).unwrap();

        assert!(deserialized.audit_all_requests);
        assert!(!deserialized.audit_auth_events);
        assert_eq!(
            deserialized.audited_routes,
            vec!["/api/v1/integrations/*"]
        );
        assert_eq!(deserialized.retention_days, Some(90));
        assert_eq!(deserialized.cleanup_interval_hours, 12);
    }

    #[test]
    fn test_retention_fields_default_from_json() {
        let json = r#"{"enabled": true}"#;
        let config: AuditConfig = serde_json::from_str(json).unwrap();
        assert!(config.retention_days.is_none());
        assert_eq!(config.cleanup_interval_hours, 24);
    }
}
