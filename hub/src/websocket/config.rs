//! WebSocket configuration for the `/ws/agent` transport (spec §6).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// WebSocket server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    /// Enable WebSocket support
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Maximum message size in bytes (default: 64KB)
    #[serde(default = "default_max_message_size")]
    pub max_message_size_bytes: usize,

    /// Maximum number of concurrent WebSocket connections per client IP
    #[serde(default = "default_max_connections_per_client")]
    pub max_connections_per_client: usize,

    /// Expected `agent.heartbeat` cadence in seconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,

    /// Seconds of heartbeat silence tolerated before an agent is marked
    /// `degraded` (§6). A further silence of the same duration again
    /// marks it `offline`.
    #[serde(default = "default_degraded_after")]
    pub degraded_after_secs: u64,

    /// Maximum frame size in bytes
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size_bytes: usize,
}

impl WebSocketConfig {
    /// Get the heartbeat interval as a Duration
    #[must_use]
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Get the degraded-after threshold as a Duration
    #[must_use]
    pub fn degraded_after(&self) -> Duration {
        Duration::from_secs(self.degraded_after_secs)
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_message_size_bytes: default_max_message_size(),
            max_connections_per_client: default_max_connections_per_client(),
            ping_interval_secs: default_ping_interval(),
            degraded_after_secs: default_degraded_after(),
            max_frame_size_bytes: default_max_frame_size(),
        }
    }
}

const fn default_enabled() -> bool {
    true
}

const fn default_max_message_size() -> usize {
    65536 // 64KB
}

const fn default_max_connections_per_client() -> usize {
    5
}

const fn default_ping_interval() -> u64 {
    30
}

const fn default_degraded_after() -> u64 {
    90
}

const fn default_max_frame_size() -> usize {
    16384 // 16KB
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_websocket_config() {
        let config = WebSocketConfig::default();
        assert!(config.enabled);
        assert_eq!(config.max_message_size_bytes, 65536);
        assert_eq!(config.ping_interval_secs, 30);
        assert_eq!(config.degraded_after_secs, 90);
    }

    #[test]
    fn test_duration_helpers() {
        let config = WebSocketConfig::default();
        assert_eq!(config.ping_interval(), Duration::from_secs(30));
        assert_eq!(config.degraded_after(), Duration::from_secs(90));
    }
}
