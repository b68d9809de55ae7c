//! Simple runbooks (spec §4.6): a pack manifest may declare a fixed list
//! of probes under one `category`; `execute` fans them out against a
//! single target and reports a flat pass/fail summary, no findings
//! synthesis.

use std::collections::HashMap;
use std::time::Instant;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::audit::{AuditLogger, AuditSeverity};
use crate::error::{Error, Result};
use crate::packs::PackCatalog;
use crate::router::{ProbeResponse, ProbeStatus, Router};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleRunbookSummary {
    pub probes_run: usize,
    pub probes_succeeded: usize,
    pub probes_failed: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimpleRunbookResult {
    pub findings: HashMap<String, ProbeResponse>,
    pub summary: SimpleRunbookSummary,
}

/// Runs every probe a pack's manifest declares under `category` against
/// `agent`, in parallel unless the manifest opts into sequential
/// execution (§4.6 "either in parallel (default) or sequentially").
pub async fn execute(
    category: &str,
    agent: Option<&str>,
    router: &Router,
    catalog: &PackCatalog,
    audit: Option<&AuditLogger>,
) -> Result<SimpleRunbookResult> {
    let pack = catalog
        .list()
        .into_iter()
        .find(|p| p.runbook.as_ref().is_some_and(|r| r.category == category))
        .ok_or_else(|| Error::Validation(format!("unknown runbook category '{category}'")))?;
    let manifest = pack.runbook.expect("filtered to packs carrying a runbook above");

    let started = Instant::now();
    let responses: Vec<(String, Result<ProbeResponse>)> = if manifest.parallel {
        let futures = manifest.probes.iter().map(|probe| async move {
            (probe.clone(), router.execute(probe, serde_json::Value::Null, agent).await)
        });
        join_all(futures).await
    } else {
        let mut out = Vec::with_capacity(manifest.probes.len());
        for probe in &manifest.probes {
            let response = router.execute(probe, serde_json::Value::Null, agent).await;
            out.push((probe.clone(), response));
        }
        out
    };

    let mut findings = HashMap::with_capacity(responses.len());
    let mut succeeded = 0usize;
    let mut failed = 0usize;
    for (probe, response) in responses {
        match response {
            Ok(resp) => {
                if resp.status == ProbeStatus::Success {
                    succeeded += 1;
                } else {
                    failed += 1;
                }
                if let Some(audit) = audit {
                    let severity = if resp.status == ProbeStatus::Success {
                        AuditSeverity::Informational
                    } else {
                        AuditSeverity::Warning
                    };
                    audit.log_custom(
                        "probe.invoked",
                        severity,
                        Some(serde_json::json!({
                            "probe": probe,
                            "agent": agent,
                            "status": resp.status,
                            "duration_ms": resp.duration_ms,
                        })),
                    );
                }
                findings.insert(probe, resp);
            }
            Err(err) => {
                failed += 1;
                findings.insert(
                    probe.clone(),
                    ProbeResponse {
                        probe,
                        status: ProbeStatus::Error,
                        data: serde_json::json!({ "error": err.to_string() }),
                        duration_ms: 0,
                        metadata: Default::default(),
                    },
                );
            }
        }
    }

    let probes_run = findings.len();
    Ok(SimpleRunbookResult {
        findings,
        summary: SimpleRunbookSummary {
            probes_run,
            probes_succeeded: succeeded,
            probes_failed: failed,
            duration_ms: started.elapsed().as_millis() as u64,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{AgentRegistry, WaiterTable};
    use crate::integration::Executor;
    use crate::persistence::memory::MemoryPersistence;
    use std::sync::Arc;

    fn router_and_catalog() -> (Router, Arc<PackCatalog>) {
        let persistence = Arc::new(MemoryPersistence::new());
        let catalog = Arc::new(PackCatalog::new());
        let router = Router::new(
            catalog.clone(),
            Arc::new(AgentRegistry::new(persistence.clone())),
            Arc::new(WaiterTable::new()),
            Arc::new(Executor::new(persistence)),
            "test-secret-at-least-16-chars".to_string(),
        );
        (router, catalog)
    }

    #[tokio::test]
    async fn unknown_category_is_rejected() {
        let (router, catalog) = router_and_catalog();
        let err = execute("no-such-category", Some("srv1"), &router, &catalog, None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn runs_every_probe_in_the_manifest_against_an_offline_agent() {
        let (router, catalog) = router_and_catalog();
        let result = execute("system-health", Some("ghost"), &router, &catalog, None)
            .await
            .unwrap();
        assert_eq!(result.summary.probes_run, 3);
        assert_eq!(result.summary.probes_failed, 3);
        assert_eq!(result.summary.probes_succeeded, 0);
        assert!(result.findings.contains_key("system.disk.usage"));
    }
}
