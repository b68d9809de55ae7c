//! Dashboard cookie sessions (spec §6 "Dashboard HTTP"): the `sonde_session`
//! cookie that backs local-admin and Entra-SSO dashboard logins.
//!
//! Sessions live in an in-memory `tower_sessions_memory_store::MemoryStore`,
//! consistent with every other cache on this hub being process-local and
//! lost on restart — there is no Redis dependency here, unlike
//! multi-instance deployments of this stack.
//!
//! - **Type-safe session data**: `TypedSession<T>` for automatic serialization
//! - **CSRF protection**: double-submit token protection for mutating requests
//!
//! ```rust,ignore
//! use sonde_hub::session::{create_memory_session_layer, SessionConfig};
//!
//! let layer = create_memory_session_layer(&SessionConfig::default());
//! ```

mod config;
mod csrf;
mod extractors;

pub use config::{CsrfConfig, SessionConfig, SessionStorage};
pub use csrf::{csrf_middleware, CsrfToken};
pub use extractors::{AuthSession, SessionAuth, SessionData, TypedSession};

// Re-export tower-sessions types for convenience
pub use tower_sessions::{Expiry, Session, SessionManagerLayer};
pub use tower_sessions_memory_store::MemoryStore;

use time::Duration;

/// Builds the `SessionManagerLayer` applied to the dashboard routes.
pub fn create_memory_session_layer(config: &SessionConfig) -> SessionManagerLayer<MemoryStore> {
    use tower_sessions::cookie::SameSite;

    let store = MemoryStore::default();

    let expiry = if config.expiry_secs == 0 {
        Expiry::OnSessionEnd
    } else if let Some(inactivity) = config.inactivity_timeout_secs {
        Expiry::OnInactivity(Duration::seconds(inactivity as i64))
    } else {
        Expiry::OnInactivity(Duration::seconds(config.expiry_secs as i64))
    };

    let same_site = match config.same_site.to_lowercase().as_str() {
        "strict" => SameSite::Strict,
        "none" => SameSite::None,
        _ => SameSite::Lax,
    };

    let cookie_name = config.cookie_name.clone();
    let cookie_path = config.cookie_path.clone();
    let cookie_domain = config.cookie_domain.clone();

    let mut layer = SessionManagerLayer::new(store)
        .with_name(cookie_name)
        .with_expiry(expiry)
        .with_secure(config.secure)
        .with_http_only(config.http_only)
        .with_same_site(same_site)
        .with_path(cookie_path);

    if let Some(domain) = cookie_domain {
        layer = layer.with_domain(domain);
    }

    layer
}
