//! OAuth state management for CSRF protection
//!
//! Manages OAuth state values to prevent CSRF attacks during the
//! authorization flow.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Data stored with OAuth state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateData {
    /// Provider name
    pub provider: String,

    /// Original redirect URI (where to send user after auth)
    pub redirect_uri: Option<String>,

    /// When this state was created (Unix timestamp)
    pub created_at: i64,

    /// Additional custom data
    pub extra: Option<serde_json::Value>,
}

/// OAuth state manager trait
///
/// Implementations store and validate OAuth state values for CSRF protection.
#[async_trait]
pub trait OAuthStateManager: Send + Sync {
    /// Create and store a new state value
    ///
    /// Returns the state string to include in the authorization URL.
    async fn create_state(&self, data: &StateData) -> Result<String, Error>;

    /// Validate and consume a state value
    ///
    /// Returns the associated data if valid, or an error if the state
    /// is invalid, expired, or already used.
    async fn validate_state(&self, state: &str) -> Result<StateData, Error>;
}

/// Generate a cryptographically secure random state value
pub fn generate_state() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::rng().random();
    base64_url_encode(&bytes)
}

/// Base64 URL-safe encoding without padding
fn base64_url_encode(bytes: &[u8]) -> String {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Process-local OAuth state manager, matching the other process-wide
/// caches on `HubRuntime` (§5) — no Redis write-behind, lost on restart.
mod dashmap_impl {
    use super::*;
    use dashmap::DashMap;
    use std::time::{Duration, Instant};

    pub struct DashMapOAuthStateManager {
        states: DashMap<String, (StateData, Instant)>,
        ttl: Duration,
    }

    impl DashMapOAuthStateManager {
        /// `ttl_secs` defaults to 600 (10 minutes) at call sites.
        pub fn new(ttl_secs: u64) -> Self {
            Self {
                states: DashMap::new(),
                ttl: Duration::from_secs(ttl_secs),
            }
        }

        fn sweep_expired(&self) {
            self.states.retain(|_, (_, created)| created.elapsed() < self.ttl);
        }
    }

    #[async_trait]
    impl OAuthStateManager for DashMapOAuthStateManager {
        async fn create_state(&self, data: &StateData) -> Result<String, Error> {
            self.sweep_expired();
            let state = generate_state();
            self.states.insert(state.clone(), (data.clone(), Instant::now()));
            Ok(state)
        }

        async fn validate_state(&self, state: &str) -> Result<StateData, Error> {
            match self.states.remove(state) {
                Some((_, (data, created))) if created.elapsed() < self.ttl => Ok(data),
                _ => Err(Error::Validation("invalid or expired OAuth state".to_string())),
            }
        }
    }
}

pub use dashmap_impl::DashMapOAuthStateManager;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_state_uniqueness() {
        let state1 = generate_state();
        let state2 = generate_state();
        assert_ne!(state1, state2);
        // Base64 URL-safe encoding of 32 bytes = 43 chars (without padding)
        assert_eq!(state1.len(), 43);
    }

    #[test]
    fn test_state_data_serialization() {
        let data = StateData {
            provider: "google".to_string(),
            redirect_uri: Some("https://example.com".to_string()),
            created_at: 1234567890,
            extra: Some(serde_json::json!({"foo": "bar"})),
        };

        let json = serde_json::to_string(&data).unwrap();
        let parsed: StateData = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.provider, "google");
        assert_eq!(parsed.redirect_uri, Some("https://example.com".to_string()));
        assert_eq!(parsed.created_at, 1234567890);
    }
}
