//! Audit logger — fire-and-forget API backed by a single sequential writer
//!
//! `AuditLogger` hands events to an unbounded channel; a single background
//! task owns the [`AuditChain`] and seals + persists events one at a time,
//! which is what guarantees correct hash-chain ordering without requiring
//! callers to hold a lock across an await point.

use tokio::sync::mpsc;

use super::chain::AuditChain;
use super::config::AuditConfig;
use super::event::{AuditEvent, AuditEventKind, AuditSeverity, AuditSource};
use crate::persistence::PersistencePort;

/// Audit logger for emitting events to the audit trail
///
/// All methods are fire-and-forget — they push onto an unbounded channel
/// and return immediately without waiting for the event to be sealed or
/// persisted. Available via `HubRuntime::audit()`.
#[derive(Clone)]
pub struct AuditLogger {
    tx: mpsc::UnboundedSender<AuditEvent>,
    service_name: String,
    config: AuditConfig,
}

impl AuditLogger {
    /// Spawn the background writer task and return a handle to it.
    ///
    /// `resume_from` carries the last sealed event's hash and sequence, if
    /// the persistence port already has history (so the chain survives a
    /// restart instead of restarting from genesis).
    pub fn spawn(
        service_name: String,
        config: AuditConfig,
        persistence: std::sync::Arc<dyn PersistencePort>,
        resume_from: Option<(String, u64)>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AuditEvent>();

        let mut chain = match resume_from {
            Some((hash, sequence)) => AuditChain::resume(service_name.clone(), hash, sequence),
            None => AuditChain::new(service_name.clone()),
        };

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let sealed = chain.seal(event);
                if let Err(err) = persistence.append_audit(sealed).await {
                    tracing::error!(error = %err, "failed to persist audit event, chain continues in memory");
                }
            }
        });

        Self {
            tx,
            service_name,
            config,
        }
    }

    /// Get the audit configuration
    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Log an audit event (fire-and-forget)
    pub fn log(&self, event: AuditEvent) {
        if self.tx.send(event).is_err() {
            tracing::error!("audit writer task has terminated, dropping event");
        }
    }

    /// Log an auth event with source information
    pub fn log_auth(&self, kind: AuditEventKind, severity: AuditSeverity, source: AuditSource) {
        let event = AuditEvent::new(kind, severity, self.service_name.clone()).with_source(source);
        self.log(event);
    }

    /// Log a custom event
    pub fn log_custom(
        &self,
        name: &str,
        severity: AuditSeverity,
        metadata: Option<serde_json::Value>,
    ) {
        let mut event = AuditEvent::new(
            AuditEventKind::Custom(name.to_string()),
            severity,
            self.service_name.clone(),
        );
        event.metadata = metadata;
        self.log(event);
    }

    /// Get the service name
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}
