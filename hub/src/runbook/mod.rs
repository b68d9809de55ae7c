//! Runbook engine (spec §4.6): composes probes into diagnostic workflows.
//! Two engines share the probe router: [`simple`] fans a pack-declared
//! probe list out flatly, [`diagnostic`] lets pack authors write a real
//! handler that calls probes adaptively and returns severity-ranked
//! findings.

pub mod diagnostic;
pub mod simple;

pub use diagnostic::{
    sort_by_severity, DiagnosticRunbook, DiagnosticRunbookRegistry, DiagnosticRunbookResult, DiagnosticRunbookSummary, Finding,
    Severity,
};
pub use simple::{SimpleRunbookResult, SimpleRunbookSummary};
