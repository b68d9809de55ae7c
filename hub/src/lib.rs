//! # sonde-hub
//!
//! Fleet diagnostics hub: agents connect over a signed WebSocket envelope,
//! the hub routes named probes to them (or to HTTP-backed integrations),
//! composes probes into runbooks, and exposes the whole surface to MCP
//! clients over a StreamableHTTP session.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sonde_hub::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::load()?;
//!     init_tracing(&config)?;
//!
//!     let runtime = std::sync::Arc::new(HubRuntime::new(config.clone()).await?);
//!     let app = server::build_router(runtime.clone());
//!
//!     Server::new(config).serve(app).await?;
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod crypto;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod health;
pub mod ids;
pub mod integration;
pub mod lockout;
pub mod mcp;
pub mod middleware;
pub mod observability;
pub mod packs;
pub mod persistence;
pub mod policy;
pub mod responses;
pub mod router;
pub mod runbook;
pub mod server;
pub mod session;
pub mod state;
pub mod tls;
pub mod websocket;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::analysis::{ActiveAnalysis, AnalysisChunk};
    pub use crate::audit::{AuditConfig, AuditEvent, AuditEventKind, AuditLogger, AuditSeverity, AuditSource};
    pub use crate::auth::{AuthConfig, AuthContext, AuthKind, Role};
    pub use crate::config::Config;
    pub use crate::domain::{
        Agent, AgentStatus, ApiKeyPolicy, ApiKeyRecord, CapabilityLevel, CriticalPath, CriticalPathStep,
        CriticalPathTarget, Integration, IntegrationStatus, Pack, ProbeDefinition,
    };
    pub use crate::error::{Error, Result};
    pub use crate::health::{health, readiness};
    pub use crate::ids::{
        AgentId, AnalysisId, ApiKeyId, AuditId, CriticalPathId, IntegrationId, MakeTypedRequestId, RequestId,
    };
    pub use crate::policy::{evaluate_agent_access, evaluate_probe_access, PolicyDecision};
    pub use crate::router::{ProbeMetadata, ProbeResponse, ProbeStatus, Router as ProbeRouter};
    pub use crate::server::Server;
    pub use crate::state::HubRuntime;

    pub use crate::middleware::{
        normalize_path, CompiledRoutePatterns, GovernorConfig, GovernorRateLimit, RateLimitExceeded,
    };

    pub use crate::websocket::{ConnectionId, WebSocketConnection};
    pub use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};

    pub use crate::session::{AuthSession, SessionAuth, SessionConfig, SessionData, TypedSession};

    pub use axum::{
        extract::{Path, Query, State},
        http::{HeaderMap, HeaderValue, StatusCode},
        response::{IntoResponse, Json, Response},
        routing::{delete, get, patch, post, put},
        Extension, Router,
    };

    pub use serde::{Deserialize, Serialize};

    pub use tracing::{debug, error, info, instrument, trace, warn, Level, Span};

    pub use tokio;

    pub use async_trait::async_trait;

    pub use thiserror::Error;
    pub use anyhow::{self, Context as AnyhowContext};

    pub use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, Utc};

    pub use uuid::Uuid;

    pub use futures::{future, stream, Future, Stream, StreamExt, TryFutureExt, TryStreamExt};

    pub use http::{Method, Uri};

    pub use crate::observability::init_tracing;
}
