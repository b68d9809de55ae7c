//! Tamper-evident audit logging
//!
//! Every event is hash-chained with BLAKE3 before being persisted, so any
//! retroactive edit to a past event is detectable by recomputing the chain.
//!
//! # Architecture
//!
//! A single background task (spawned by [`AuditLogger::spawn`]) owns the
//! [`AuditChain`] and processes events one at a time from an unbounded
//! channel, which is what guarantees the hash chain is built in a consistent
//! order. Middleware, auth, the probe dispatcher, and the runbook engine all
//! send events through the same `AuditLogger` handle; none of them block on
//! persistence.

pub mod chain;
pub mod config;
pub mod event;
pub mod logger;
pub mod middleware;

pub use chain::{verify_chain, AuditChain, ChainVerificationError};
pub use config::AuditConfig;
pub use event::{AuditEvent, AuditEventKind, AuditSeverity, AuditSource};
pub use logger::AuditLogger;
pub use middleware::{audit_layer, AuditRoute};
