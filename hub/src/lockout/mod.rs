//! Login lockout with progressive delay and account lockout
//!
//! Provides brute force protection for the dashboard login endpoint by
//! tracking failed attempts per identity in an in-memory map. Supports
//! configurable progressive delays and threshold-based account lockout.
//! State is process-local and non-persistent: a hub restart clears every
//! attempt counter and lock, the same tradeoff made for every other
//! in-memory cache in this hub.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! let lockout = LoginLockout::new(lockout_config).with_audit(audit_logger);
//!
//! // In the login handler:
//! let status = lockout.check(&email)?;
//! if status.locked { /* return 423 */ }
//!
//! match authenticate(&creds).await {
//!     Ok(session) => { lockout.record_success(&email)?; Ok(session) }
//!     Err(_) => {
//!         let status = lockout.record_failure(&email)?;
//!         if status.delay_ms > 0 {
//!             tokio::time::sleep(Duration::from_millis(status.delay_ms)).await;
//!         }
//!         Err(Error::Auth("Invalid credentials".into()))
//!     }
//! }
//! ```

pub mod config;
pub mod middleware;
pub mod service;

pub use config::LockoutConfig;
pub use middleware::LockoutMiddleware;
pub use service::{LockoutStatus, LoginLockout, UnlockReason};
