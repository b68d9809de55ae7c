//! Diagnostic runbooks (spec §4.6): author-registered handlers that call
//! probes adaptively and synthesize severity-ranked findings, as opposed
//! to [`super::simple`]'s fixed fan-out. Bounded by a 45s wall-clock
//! budget and a 10KiB per-probe payload cap; exceeding either sets a flag
//! on the result rather than failing the call.

pub mod examples;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::audit::{AuditLogger, AuditSeverity};
use crate::error::{Error, Result};
use crate::router::{ProbeResponse, ProbeStatus, Router};

const WALL_CLOCK_BUDGET: Duration = Duration::from_secs(45);
const PER_PROBE_PAYLOAD_CAP: usize = 10 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// One synthesized observation (§4.6 `Finding`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    pub title: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    #[serde(default)]
    pub related_probes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRunbookSummary {
    pub probes_run: usize,
    pub findings_count: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRunbookResult {
    pub findings: Vec<Finding>,
    pub probe_results: HashMap<String, ProbeResponse>,
    pub summary: DiagnosticRunbookSummary,
    pub truncated: bool,
    pub timed_out: bool,
}

/// Bound into a running handler: lets it call probes through the router
/// while the registry enforces the payload cap on every response and
/// keeps a running tally so a budget timeout still has something to
/// return (§4.6 "exceeding either sets the corresponding flag rather
/// than failing the call").
pub struct RunbookContext<'a> {
    router: &'a Router,
    pub connected_agents: Vec<String>,
    collected: Arc<Mutex<Vec<(String, ProbeResponse)>>>,
    truncated: Arc<AtomicBool>,
    audit: Option<&'a AuditLogger>,
}

impl<'a> RunbookContext<'a> {
    pub async fn run_probe(&self, probe: &str, params: Value, agent: Option<&str>) -> Result<ProbeResponse> {
        let mut response = self.router.execute(probe, params, agent).await?;
        if let Some(audit) = self.audit {
            let severity = match response.status {
                ProbeStatus::Success => AuditSeverity::Informational,
                ProbeStatus::Error | ProbeStatus::Timeout => AuditSeverity::Warning,
            };
            audit.log_custom(
                "probe.invoked",
                severity,
                Some(serde_json::json!({
                    "probe": probe,
                    "agent": agent,
                    "status": response.status,
                    "duration_ms": response.duration_ms,
                })),
            );
        }
        if approx_json_size(&response.data) > PER_PROBE_PAYLOAD_CAP {
            self.truncated.store(true, Ordering::Relaxed);
            response.data = serde_json::json!({ "truncated": true });
        }
        self.collected
            .lock()
            .expect("runbook context mutex poisoned")
            .push((probe.to_string(), response.clone()));
        Ok(response)
    }
}

fn approx_json_size(value: &Value) -> usize {
    serde_json::to_vec(value).map(|bytes| bytes.len()).unwrap_or(0)
}

/// An author-coded diagnostic workflow (§4.6). Implementations call
/// [`RunbookContext::run_probe`] at will and synthesize findings from the
/// results; they never see a raw probe failure propagate — the context
/// itself only returns `Err` for genuinely exceptional conditions
/// (unknown probe prefix), surfacing ordinary probe failures as
/// `ProbeStatus::Error`/`Timeout` inside the response, same as the router.
#[async_trait]
pub trait DiagnosticRunbook: Send + Sync {
    fn category(&self) -> &str;
    async fn run(&self, params: Value, ctx: &RunbookContext<'_>) -> Result<DiagnosticRunbookResult>;
}

/// Registry of diagnostic runbooks, keyed by category, enforcing the
/// wall-clock budget and payload cap around every run.
#[derive(Default)]
pub struct DiagnosticRunbookRegistry {
    handlers: HashMap<String, Arc<dyn DiagnosticRunbook>>,
}

impl DiagnosticRunbookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, runbook: Arc<dyn DiagnosticRunbook>) {
        self.handlers.insert(runbook.category().to_string(), runbook);
    }

    pub fn get(&self, category: &str) -> Option<Arc<dyn DiagnosticRunbook>> {
        self.handlers.get(category).cloned()
    }

    pub fn categories(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// A registry pre-seeded with the two worked examples this hub ships
    /// (§4.6): `system-health` and `proxmox-cluster`.
    pub fn with_builtin_examples() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(examples::SystemHealthRunbook));
        registry.register(Arc::new(examples::ProxmoxClusterRunbook));
        registry
    }

    pub async fn execute(
        &self,
        category: &str,
        params: Value,
        router: &Router,
        connected_agents: Vec<String>,
        audit: Option<&AuditLogger>,
    ) -> Result<DiagnosticRunbookResult> {
        let handler = self
            .get(category)
            .ok_or_else(|| Error::Validation(format!("unknown runbook category '{category}'")))?;

        let collected = Arc::new(Mutex::new(Vec::new()));
        let truncated = Arc::new(AtomicBool::new(false));
        let ctx = RunbookContext {
            audit,
            router,
            connected_agents,
            collected: collected.clone(),
            truncated: truncated.clone(),
        };

        match tokio::time::timeout(WALL_CLOCK_BUDGET, handler.run(params, &ctx)).await {
            Ok(Ok(mut result)) => {
                result.truncated = result.truncated || truncated.load(Ordering::Relaxed);
                Ok(result)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => {
                let probes = collected.lock().expect("runbook context mutex poisoned").clone();
                let probes_run = probes.len();
                Ok(DiagnosticRunbookResult {
                    findings: Vec::new(),
                    probe_results: probes.into_iter().collect(),
                    summary: DiagnosticRunbookSummary {
                        probes_run,
                        findings_count: 0,
                        duration_ms: WALL_CLOCK_BUDGET.as_millis() as u64,
                    },
                    truncated: truncated.load(Ordering::Relaxed),
                    timed_out: true,
                })
            }
        }
    }
}

/// Ranks [`Finding`]s most-severe first, matching `health_check`'s
/// "returning aggregated findings sorted by severity" (§4.7).
pub fn sort_by_severity(findings: &mut [Finding]) {
    findings.sort_by(|a, b| b.severity.cmp(&a.severity));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{AgentRegistry, WaiterTable};
    use crate::integration::Executor;
    use crate::packs::PackCatalog;
    use crate::persistence::memory::MemoryPersistence;

    struct AlwaysTimesOut;

    #[async_trait]
    impl DiagnosticRunbook for AlwaysTimesOut {
        fn category(&self) -> &str {
            "never-finishes"
        }

        async fn run(&self, _params: Value, ctx: &RunbookContext<'_>) -> Result<DiagnosticRunbookResult> {
            ctx.run_probe("system.disk.usage", Value::Null, Some("ghost")).await.ok();
            tokio::time::sleep(Duration::from_secs(60)).await;
            unreachable!("budget should cut this off first")
        }
    }

    fn router() -> Router {
        let persistence = Arc::new(MemoryPersistence::new());
        Router::new(
            Arc::new(PackCatalog::new()),
            Arc::new(AgentRegistry::new(persistence.clone())),
            Arc::new(WaiterTable::new()),
            Arc::new(Executor::new(persistence)),
            "test-secret-at-least-16-chars".to_string(),
        )
    }

    #[test]
    fn severity_sorts_critical_first() {
        let mut findings = vec![
            Finding {
                severity: Severity::Info,
                title: "a".into(),
                detail: "".into(),
                remediation: None,
                related_probes: vec![],
            },
            Finding {
                severity: Severity::Critical,
                title: "b".into(),
                detail: "".into(),
                remediation: None,
                related_probes: vec![],
            },
        ];
        sort_by_severity(&mut findings);
        assert_eq!(findings[0].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn unknown_category_is_rejected() {
        let registry = DiagnosticRunbookRegistry::new();
        let router = router();
        let err = registry
            .execute("no-such-thing", Value::Null, &router, vec![], None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn budget_timeout_still_returns_partial_results() {
        let mut registry = DiagnosticRunbookRegistry::new();
        registry.register(Arc::new(AlwaysTimesOut));
        let router = router();

        let handle = tokio::spawn(async move { registry.execute("never-finishes", Value::Null, &router, vec![], None).await });
        tokio::time::advance(WALL_CLOCK_BUDGET + Duration::from_secs(1)).await;
        let result = handle.await.unwrap().unwrap();

        assert!(result.timed_out);
        assert_eq!(result.probe_results.len(), 1);
    }
}
