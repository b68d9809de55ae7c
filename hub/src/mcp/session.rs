//! MCP session table (spec §4.7): one entry per initialised StreamableHTTP
//! session, keyed by the `Mcp-Session-Id` header. Mirrors the shape of
//! `session::SessionData`'s in-memory cousin but keyed by a custom header
//! instead of a cookie, and carries the `AuthContext` resolved once at
//! `initialize` time rather than re-resolved per call.

use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::auth::AuthContext;

/// Opaque per-session identifier minted on `initialize` (§3 "Session").
pub type McpSessionId = crate::ids::SessionId;

/// State held for the lifetime of one MCP client connection.
pub struct McpSession {
    pub auth: AuthContext,
    pub created_at: DateTime<Utc>,
    last_activity: Mutex<Instant>,
}

impl McpSession {
    pub fn new(auth: AuthContext) -> Self {
        Self {
            auth,
            created_at: Utc::now(),
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub fn touch(&self) {
        *self.last_activity.lock().expect("session activity mutex poisoned") = Instant::now();
    }

    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity.lock().expect("session activity mutex poisoned").elapsed()
    }
}
