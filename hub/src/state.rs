//! Application state: the collaborators every handler reaches through
//! (spec §4). [`HubRuntime`] owns one instance of each — persistence,
//! the agent dispatcher halves, the probe router, runbook registries,
//! the audit logger, and the auth subsystems — and is shared behind an
//! `Arc` as axum's extractor state.

use std::sync::Arc;

use dashmap::DashMap;

use crate::analysis::ActiveAnalysis;
use crate::audit::AuditLogger;
use crate::auth::oauth::{DashMapOAuthStateManager, EntraProvider, McpAuthorizationServer};
use crate::config::Config;
use crate::dispatcher::{AgentRegistry, WaiterTable};
use crate::error::Result;
use crate::integration::Executor;
use crate::lockout::LoginLockout;
use crate::mcp::{McpSession, McpSessionId};
use crate::middleware::GovernorRateLimit;
use crate::packs::PackCatalog;
use crate::persistence::{MemoryPersistence, PersistencePort, SqlitePersistence};
use crate::router::Router as ProbeRouter;
use crate::runbook::DiagnosticRunbookRegistry;

/// Everything a request handler or background task needs, assembled once
/// at startup and shared read-only thereafter (the interior collaborators
/// -- `DashMap`s, atomics -- carry their own synchronization).
pub struct HubRuntime {
    pub config: Arc<Config>,
    pub persistence: Arc<dyn PersistencePort>,
    pub registry: Arc<AgentRegistry>,
    pub waiters: Arc<WaiterTable>,
    pub catalog: Arc<PackCatalog>,
    pub executor: Arc<Executor>,
    pub router: Arc<ProbeRouter>,
    pub runbooks: Arc<DiagnosticRunbookRegistry>,
    pub audit: AuditLogger,
    pub mcp_auth: Arc<McpAuthorizationServer>,
    pub entra: Option<Arc<EntraProvider>>,
    pub lockout: Arc<LoginLockout>,
    pub governor: Arc<GovernorRateLimit>,
    pub oauth_state: Arc<DashMapOAuthStateManager>,
    pub mcp_sessions: Arc<DashMap<McpSessionId, McpSession>>,
    /// Streaming-analysis broadcast seam (§5 process-wide state); no
    /// analyser is wired up to it yet (§9 "narrow seam").
    pub analysis: Arc<ActiveAnalysis>,
}

impl HubRuntime {
    /// Builds every collaborator from `config`. Persistence backs onto
    /// SQLite unless `db_path` is the sentinel `:memory:`, which tests use
    /// to get a fresh `MemoryPersistence` per run.
    pub async fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);

        let persistence: Arc<dyn PersistencePort> = if config.db_path == ":memory:" {
            Arc::new(MemoryPersistence::new())
        } else {
            Arc::new(SqlitePersistence::open(&config.db_path).await?)
        };

        let registry = Arc::new(AgentRegistry::new(persistence.clone()));
        let waiters = Arc::new(WaiterTable::new());
        let catalog = Arc::new(PackCatalog::new());
        let executor = Arc::new(Executor::new(persistence.clone()));
        let router = Arc::new(ProbeRouter::new(
            catalog.clone(),
            registry.clone(),
            waiters.clone(),
            executor.clone(),
            config.secret.clone(),
        ));
        let runbooks = Arc::new(DiagnosticRunbookRegistry::with_builtin_examples());

        let audit = AuditLogger::spawn(config.service_name.clone(), config.audit.clone(), persistence.clone(), None);

        let mcp_auth = Arc::new(McpAuthorizationServer::new());

        let entra = config
            .auth
            .oauth
            .entra
            .clone()
            .map(EntraProvider::new)
            .transpose()?
            .map(Arc::new);

        let lockout = Arc::new(LoginLockout::new(config.lockout.clone()).with_audit(audit.clone()));
        let governor = Arc::new(GovernorRateLimit::new(config.rate_limit.clone()));
        let oauth_state = Arc::new(DashMapOAuthStateManager::new(600));

        Ok(Self {
            config,
            persistence,
            registry,
            waiters,
            catalog,
            executor,
            router,
            runbooks,
            audit,
            mcp_auth,
            entra,
            lockout,
            governor,
            oauth_state,
            mcp_sessions: Arc::new(DashMap::new()),
            analysis: Arc::new(ActiveAnalysis::new()),
        })
    }
}
