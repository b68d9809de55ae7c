//! Health check handlers, adapted from the teacher's liveness/readiness
//! pair to this hub's two dependencies: the persistence port and the
//! agent registry's live WebSocket connections.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::state::HubRuntime;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub service: String,
    pub connected_agents: usize,
    pub persistence: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Liveness probe: always 200 if the process is scheduling requests.
pub async fn health(State(runtime): State<Arc<HubRuntime>>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        service: runtime.config.service_name.clone(),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
    };
    (StatusCode::OK, Json(response))
}

/// Readiness probe: checks the persistence port is reachable. A fleet
/// with zero connected agents is still ready — that's a fact about the
/// fleet, not the hub.
pub async fn readiness(State(runtime): State<Arc<HubRuntime>>) -> impl IntoResponse {
    let persistence = match runtime.persistence.list_agents().await {
        Ok(_) => DependencyStatus {
            healthy: true,
            message: Some("reachable".to_string()),
        },
        Err(err) => DependencyStatus {
            healthy: false,
            message: Some(err.to_string()),
        },
    };

    let ready = persistence.healthy;
    let response = ReadinessResponse {
        ready,
        service: runtime.config.service_name.clone(),
        connected_agents: runtime.registry.connected_count(),
        persistence,
    };

    let status = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            service: "sonde-hub".to_string(),
            version: Some("1.0.0".to_string()),
        };
        assert_eq!(response.status, "healthy");
    }
}
