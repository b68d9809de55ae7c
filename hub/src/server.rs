//! HTTP server assembly and graceful shutdown.
//!
//! [`build_router`] wires every handler module onto one [`axum::Router`]
//! over the shared [`HubRuntime`] state; [`Server::serve`] binds it and
//! drives the listener with the same middleware stack the teacher's
//! service used, adapted to this hub's flat [`Config`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    catch_panic::CatchPanicLayer,
    compression::CompressionLayer,
    cors::CorsLayer,
    limit::RequestBodyLimitLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use crate::{
    api, auth,
    config::Config,
    error::Result,
    health,
    mcp,
    middleware::{
        apply_security_headers, request_id_layer, request_id_propagation_layer, sensitive_headers_layer,
        GovernorRateLimit,
    },
    session,
    state::HubRuntime,
    websocket,
};

/// Assembles the full router: unauthenticated health checks, the agent
/// WebSocket, the MCP StreamableHTTP endpoint (auth resolved per-call
/// inside `mcp::handler`), and the cookie/bearer-gated dashboard API and
/// auth routes.
pub fn build_router(runtime: Arc<HubRuntime>) -> Router {
    // Order matters: `route_layer`s added later wrap outer and run first, so
    // `require_auth` (added last) runs before the governor limiter, giving
    // it the `AuthContext` to key per-identity limits on.
    let dashboard_api = api::router()
        .route_layer(axum::middleware::from_fn_with_state(
            (*runtime.governor).clone(),
            GovernorRateLimit::middleware,
        ))
        .route_layer(axum::middleware::from_fn_with_state(runtime.clone(), api::require_auth));

    let auth_routes = Router::new()
        .route("/login", axum::routing::post(auth::routes::login))
        .route("/logout", axum::routing::post(auth::routes::logout))
        .route("/session", axum::routing::get(auth::routes::current_session))
        .route("/entra/login", axum::routing::get(auth::routes::entra_login))
        .route("/entra/callback", axum::routing::get(auth::routes::entra_callback));

    let app = Router::new()
        .route("/health", axum::routing::get(health::health))
        .route("/ready", axum::routing::get(health::readiness))
        .route("/ws/agent", axum::routing::get(websocket::upgrade))
        .route("/mcp", axum::routing::post(mcp::handler::post).delete(mcp::handler::delete))
        .nest("/api/v1", dashboard_api)
        .nest("/auth", auth_routes)
        .layer(session::create_memory_session_layer(&runtime.config.session))
        .with_state(runtime.clone());

    apply_security_headers(app, &runtime.config.security_headers, runtime.config.tls_enabled)
}

/// Owns the bound listener and the middleware layered outside the router
/// returned by [`build_router`] (compression, tracing, panic recovery,
/// request-id propagation -- concerns that apply to every route including
/// ones a future module adds, so they live here rather than in the router
/// itself).
pub struct Server {
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub async fn serve(self, app: Router) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| crate::error::Error::Config(format!("invalid host/port: {e}")))?;

        tracing::info!(service = %self.config.service_name, %addr, "starting server");

        let body_limit = self.config.request_body_limit_bytes;

        let app = app
            .layer(CorsLayer::permissive())
            .layer(CompressionLayer::new())
            .layer(RequestBodyLimitLayer::new(body_limit))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().include_headers(false))
                    .on_response(DefaultOnResponse::new()),
            )
            .layer(sensitive_headers_layer())
            .layer(request_id_propagation_layer())
            .layer(request_id_layer())
            .layer(CatchPanicLayer::new());

        let listener = TcpListener::bind(&addr).await?;
        tracing::info!(%addr, "server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(self.config.graceful_shutdown_timeout_secs))
            .await?;

        tracing::info!("server shutdown complete");
        Ok(())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

async fn shutdown_signal(grace_secs: u64) {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("received SIGTERM, starting graceful shutdown"),
    }

    tracing::info!(grace_secs, "draining in-flight requests");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_creation() {
        let config = Config {
            secret: "sixteen-chars!!!".to_string(),
            ..Config::default()
        };
        let server = Server::new(config.clone());
        assert_eq!(server.config().port, config.port);
    }
}
