//! Binary entry point: loads configuration, wires the runtime, and serves
//! the router built in [`sonde_hub::server`] until a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use sonde_hub::config::Config;
use sonde_hub::dispatcher::AgentRegistry;
use sonde_hub::error::Result;
use sonde_hub::observability::{init_tracing, shutdown_tracing};
use sonde_hub::server::{self, Server};
use sonde_hub::state::HubRuntime;

/// How often the background sweep checks for silent agents. Agents heartbeat
/// every 30s; the hub only flips one to degraded after 90s of silence, so a
/// 15s sweep tick catches that within one heartbeat's margin.
const SWEEP_INTERVAL: Duration = Duration::from_secs(15);
const DEGRADED_AFTER: Duration = Duration::from_secs(90);

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config)?;

    let runtime = Arc::new(HubRuntime::new(config.clone()).await?);
    spawn_agent_sweep(runtime.registry.clone());

    let app = server::build_router(runtime.clone());
    let result = Server::new(config).serve(app).await;

    shutdown_tracing();
    result
}

fn spawn_agent_sweep(registry: Arc<AgentRegistry>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(err) = registry.sweep(DEGRADED_AFTER).await {
                tracing::error!(error = %err, "agent liveness sweep failed");
            }
        }
    });
}
