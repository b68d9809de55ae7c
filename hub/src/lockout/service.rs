//! Login lockout service
//!
//! Core service for tracking failed login attempts, enforcing progressive
//! delays, and locking accounts after repeated failures. State lives in an
//! in-memory `DashMap` — process-local and non-persistent, like every other
//! cache in this hub (see the design ledger's process-local-state entry).
//! A hub restart clears all attempt counters and active lockouts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, info, warn};

use super::config::LockoutConfig;
use crate::audit::{AuditEvent, AuditEventKind, AuditLogger, AuditSeverity};
use crate::error::Result;

/// Status of a login lockout check
///
/// Returned by [`LoginLockout::check`] and [`LoginLockout::record_failure`]
/// to inform the caller about the current lockout state.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct LockoutStatus {
    /// Whether the account is currently locked
    pub locked: bool,
    /// Number of failed attempts in the current window
    pub attempt_count: u32,
    /// Maximum attempts allowed before lockout
    pub max_attempts: u32,
    /// Seconds remaining until lockout expires (0 if not locked)
    pub lockout_remaining_secs: u64,
    /// Recommended delay in milliseconds before responding (0 if no delay)
    pub delay_ms: u64,
}

/// Per-identity attempt tracking entry
#[derive(Debug, Clone)]
struct LockoutEntry {
    attempt_count: u32,
    window_expires_at: Instant,
    locked_until: Option<Instant>,
}

/// Why an identity was unlocked, for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockReason {
    SuccessfulLogin,
    AdminAction,
    WindowExpired,
}

impl std::fmt::Display for UnlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnlockReason::SuccessfulLogin => write!(f, "successful_login"),
            UnlockReason::AdminAction => write!(f, "admin_action"),
            UnlockReason::WindowExpired => write!(f, "window_expired"),
        }
    }
}

/// Login lockout service
///
/// Tracks failed login attempts per identity and enforces progressive
/// delays and account lockout. Construct once at startup and share via
/// axum `State` or `Extension`.
#[derive(Clone)]
pub struct LoginLockout {
    config: LockoutConfig,
    entries: Arc<DashMap<String, LockoutEntry>>,
    audit_logger: Option<AuditLogger>,
}

impl LoginLockout {
    /// Create a new login lockout service
    pub fn new(config: LockoutConfig) -> Self {
        Self {
            config,
            entries: Arc::new(DashMap::new()),
            audit_logger: None,
        }
    }

    /// Attach an audit logger; lock/unlock events are then written to the
    /// audit chain as well as traced.
    pub fn with_audit(mut self, audit_logger: AuditLogger) -> Self {
        self.audit_logger = Some(audit_logger);
        self
    }

    /// Check the lockout status for an identity without recording a failure
    pub fn check(&self, identity: &str) -> Result<LockoutStatus> {
        if !self.config.enabled {
            return Ok(self.unlocked_status(0));
        }

        let now = Instant::now();
        let Some(mut entry) = self.entries.get_mut(identity) else {
            return Ok(self.unlocked_status(0));
        };

        if let Some(locked_until) = entry.locked_until {
            if now < locked_until {
                let remaining = (locked_until - now).as_secs();
                return Ok(LockoutStatus {
                    locked: true,
                    attempt_count: entry.attempt_count,
                    max_attempts: self.config.max_attempts,
                    lockout_remaining_secs: remaining,
                    delay_ms: 0,
                });
            }
            // lock has expired
            entry.locked_until = None;
            entry.attempt_count = 0;
        }

        if now >= entry.window_expires_at {
            entry.attempt_count = 0;
        }

        let delay_ms = self.compute_delay(entry.attempt_count);
        Ok(LockoutStatus {
            locked: false,
            attempt_count: entry.attempt_count,
            max_attempts: self.config.max_attempts,
            lockout_remaining_secs: 0,
            delay_ms,
        })
    }

    /// Record a failed login attempt for an identity
    ///
    /// Increments the failure counter and, if the threshold is reached,
    /// locks the account. Returns the updated lockout status.
    pub fn record_failure(&self, identity: &str) -> Result<LockoutStatus> {
        if !self.config.enabled {
            return Ok(self.unlocked_status(0));
        }

        let now = Instant::now();
        let window = Duration::from_secs(self.config.window_secs);

        let mut entry = self
            .entries
            .entry(identity.to_string())
            .or_insert_with(|| LockoutEntry {
                attempt_count: 0,
                window_expires_at: now + window,
                locked_until: None,
            });

        if now >= entry.window_expires_at {
            entry.attempt_count = 0;
            entry.window_expires_at = now + window;
        }

        entry.attempt_count += 1;
        let count = entry.attempt_count;

        debug!(
            identity = identity,
            attempt_count = count,
            max_attempts = self.config.max_attempts,
            "Login failure recorded"
        );

        if self.config.warning_threshold > 0
            && count == self.config.warning_threshold
            && count < self.config.max_attempts
        {
            warn!(
                identity = identity,
                attempt_count = count,
                remaining_attempts = self.config.max_attempts - count,
                "Identity approaching lockout threshold"
            );
        }

        if count >= self.config.max_attempts {
            let locked_until = now + Duration::from_secs(self.config.lockout_duration_secs);
            entry.locked_until = Some(locked_until);

            warn!(
                identity = identity,
                attempt_count = count,
                lockout_duration_secs = self.config.lockout_duration_secs,
                "Account locked due to repeated login failures"
            );

            drop(entry);
            self.audit_locked(identity, count, self.config.lockout_duration_secs);

            return Ok(LockoutStatus {
                locked: true,
                attempt_count: count,
                max_attempts: self.config.max_attempts,
                lockout_remaining_secs: self.config.lockout_duration_secs,
                delay_ms: 0,
            });
        }

        let delay_ms = self.compute_delay(count);
        Ok(LockoutStatus {
            locked: false,
            attempt_count: count,
            max_attempts: self.config.max_attempts,
            lockout_remaining_secs: 0,
            delay_ms,
        })
    }

    /// Record a successful login, clearing all lockout state
    pub fn record_success(&self, identity: &str) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }

        if let Some((_, entry)) = self.entries.remove(identity) {
            if entry.locked_until.is_some() {
                info!(identity = identity, "Account unlocked via successful login");
                self.audit_unlocked(identity, UnlockReason::SuccessfulLogin);
            }
        }

        Ok(())
    }

    /// Manually unlock an account (admin action)
    pub fn unlock(&self, identity: &str) -> Result<()> {
        self.entries.remove(identity);
        info!(identity = identity, "Account manually unlocked (admin)");
        self.audit_unlocked(identity, UnlockReason::AdminAction);
        Ok(())
    }

    fn unlocked_status(&self, attempt_count: u32) -> LockoutStatus {
        LockoutStatus {
            locked: false,
            attempt_count,
            max_attempts: self.config.max_attempts,
            lockout_remaining_secs: 0,
            delay_ms: 0,
        }
    }

    /// Compute the progressive delay for a given attempt count
    ///
    /// Returns 0 if progressive delay is disabled or attempt count is 0.
    /// Formula: `min(base_ms * multiplier^(attempts-1), max_ms)`
    fn compute_delay(&self, attempt_count: u32) -> u64 {
        if !self.config.progressive_delay_enabled || attempt_count == 0 {
            return 0;
        }

        let exponent = (attempt_count - 1) as f64;
        let delay = self.config.base_delay_ms as f64 * self.config.delay_multiplier.powf(exponent);

        if delay.is_finite() {
            (delay as u64).min(self.config.max_delay_ms)
        } else {
            self.config.max_delay_ms
        }
    }

    fn audit_locked(&self, identity: &str, attempt_count: u32, lockout_duration_secs: u64) {
        let Some(logger) = &self.audit_logger else {
            return;
        };
        let event = AuditEvent::new(
            AuditEventKind::AuthAccountLocked,
            AuditSeverity::Warning,
            logger.service_name().to_string(),
        )
        .with_metadata(serde_json::json!({
            "identity": identity,
            "attempt_count": attempt_count,
            "lockout_duration_secs": lockout_duration_secs,
        }));
        logger.log(event);
    }

    fn audit_unlocked(&self, identity: &str, reason: UnlockReason) {
        let Some(logger) = &self.audit_logger else {
            return;
        };
        let event = AuditEvent::new(
            AuditEventKind::AuthAccountUnlocked,
            AuditSeverity::Notice,
            logger.service_name().to_string(),
        )
        .with_metadata(serde_json::json!({
            "identity": identity,
            "reason": reason.to_string(),
        }));
        logger.log(event);
    }

    /// Remove entries whose window has expired and which are not locked,
    /// bounding map growth. Call periodically from a background sweep.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| match entry.locked_until {
            Some(locked_until) => now < locked_until,
            None => now < entry.window_expires_at,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lockout_with(config: LockoutConfig) -> LoginLockout {
        LoginLockout::new(config)
    }

    #[test]
    fn test_compute_delay_zero_attempts() {
        let lockout = lockout_with(LockoutConfig::default());
        assert_eq!(lockout.compute_delay(0), 0);
    }

    #[test]
    fn test_compute_delay_first_attempt() {
        let lockout = lockout_with(LockoutConfig::default());
        assert_eq!(lockout.compute_delay(1), 1000);
    }

    #[test]
    fn test_compute_delay_progressive() {
        let lockout = lockout_with(LockoutConfig::default());
        assert_eq!(lockout.compute_delay(2), 2000);
        assert_eq!(lockout.compute_delay(3), 4000);
        assert_eq!(lockout.compute_delay(4), 8000);
        assert_eq!(lockout.compute_delay(5), 16000);
    }

    #[test]
    fn test_compute_delay_caps_at_max() {
        let lockout = lockout_with(LockoutConfig::default());
        assert_eq!(lockout.compute_delay(6), 30000);
        assert_eq!(lockout.compute_delay(100), 30000);
    }

    #[test]
    fn test_compute_delay_disabled() {
        let mut config = LockoutConfig::default();
        config.progressive_delay_enabled = false;
        let lockout = lockout_with(config);
        assert_eq!(lockout.compute_delay(1), 0);
        assert_eq!(lockout.compute_delay(5), 0);
    }

    #[test]
    fn test_compute_delay_multiplier_one() {
        let mut config = LockoutConfig::default();
        config.delay_multiplier = 1.0;
        let lockout = lockout_with(config);
        assert_eq!(lockout.compute_delay(1), 1000);
        assert_eq!(lockout.compute_delay(5), 1000);
        assert_eq!(lockout.compute_delay(100), 1000);
    }

    #[test]
    fn test_compute_delay_overflow_protection() {
        let mut config = LockoutConfig::default();
        config.delay_multiplier = 10.0;
        config.max_delay_ms = 30000;
        let lockout = lockout_with(config);
        assert_eq!(lockout.compute_delay(100), 30000);
    }

    #[test]
    fn test_check_unknown_identity_is_unlocked() {
        let lockout = lockout_with(LockoutConfig::default());
        let status = lockout.check("nobody@example.com").unwrap();
        assert!(!status.locked);
        assert_eq!(status.attempt_count, 0);
    }

    #[test]
    fn test_record_failure_increments_and_locks_at_threshold() {
        let mut config = LockoutConfig::default();
        config.max_attempts = 3;
        let lockout = lockout_with(config);

        let s1 = lockout.record_failure("alice").unwrap();
        assert!(!s1.locked);
        assert_eq!(s1.attempt_count, 1);

        let s2 = lockout.record_failure("alice").unwrap();
        assert!(!s2.locked);
        assert_eq!(s2.attempt_count, 2);

        let s3 = lockout.record_failure("alice").unwrap();
        assert!(s3.locked);
        assert_eq!(s3.attempt_count, 3);

        let checked = lockout.check("alice").unwrap();
        assert!(checked.locked);
        assert!(checked.lockout_remaining_secs > 0);
    }

    #[test]
    fn test_record_success_clears_state() {
        let lockout = lockout_with(LockoutConfig::default());
        lockout.record_failure("bob").unwrap();
        lockout.record_failure("bob").unwrap();
        lockout.record_success("bob").unwrap();

        let status = lockout.check("bob").unwrap();
        assert!(!status.locked);
        assert_eq!(status.attempt_count, 0);
    }

    #[test]
    fn test_unlock_admin_action_clears_lock() {
        let mut config = LockoutConfig::default();
        config.max_attempts = 1;
        let lockout = lockout_with(config);

        let status = lockout.record_failure("carol").unwrap();
        assert!(status.locked);

        lockout.unlock("carol").unwrap();
        let rechecked = lockout.check("carol").unwrap();
        assert!(!rechecked.locked);
        assert_eq!(rechecked.attempt_count, 0);
    }

    #[test]
    fn test_disabled_config_never_locks() {
        let mut config = LockoutConfig::default();
        config.enabled = false;
        config.max_attempts = 1;
        let lockout = lockout_with(config);

        let status = lockout.record_failure("dave").unwrap();
        assert!(!status.locked);
    }
}
