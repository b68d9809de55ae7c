//! The eight MCP tools (spec §4.7). Every function here takes the
//! resolved [`AuthContext`] and raw JSON-RPC `arguments`, applies the
//! policy check the router itself doesn't know how to do (it has no
//! notion of a caller), and returns a [`ToolCallResult`] — never a JSON-RPC
//! error, since a denied/invalid call is still a successful RPC that
//! carries `isError:true` in its result (§7).

use serde_json::{json, Value};

use crate::audit::AuditSeverity;
use crate::auth::{AuthContext, AuthKind};
use crate::error::Error;
use crate::ids::ApiKeyId;
use crate::policy;
use crate::router::{ProbeResponse, ProbeStatus};
use crate::runbook::simple;
use crate::state::HubRuntime;

/// MCP tool-result content: a list of content blocks plus the `isError`
/// flag clients branch on instead of a JSON-RPC error envelope.
pub struct ToolCallResult {
    pub content: Vec<Value>,
    pub is_error: bool,
}

impl ToolCallResult {
    fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![json!({ "type": "text", "text": text.into() })],
            is_error: false,
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![json!({ "type": "text", "text": text.into() })],
            is_error: true,
        }
    }

    fn json(value: Value) -> Self {
        Self::text(serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()))
    }
}

impl From<Error> for ToolCallResult {
    fn from(err: Error) -> Self {
        ToolCallResult::error(err.as_mcp_message())
    }
}

/// Static catalogue of tool descriptors returned by `tools/list`.
pub fn descriptors() -> Vec<Value> {
    vec![
        json!({
            "name": "probe",
            "description": "Run a single probe against an agent or integration.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "agent": {"type": "string"},
                    "probe": {"type": "string"},
                    "params": {"type": "object"}
                },
                "required": ["probe"]
            }
        }),
        json!({
            "name": "diagnose",
            "description": "Run a named runbook category (diagnostic runbooks are preferred over simple ones).",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "agent": {"type": "string"},
                    "category": {"type": "string"},
                    "params": {"type": "object"}
                },
                "required": ["category"]
            }
        }),
        json!({
            "name": "list_agents",
            "description": "List all agents visible under the caller's policy.",
            "inputSchema": {"type": "object", "properties": {}}
        }),
        json!({
            "name": "agent_overview",
            "description": "Detail for one agent: liveness, loaded packs, last heartbeat.",
            "inputSchema": {
                "type": "object",
                "properties": {"agent": {"type": "string"}},
                "required": ["agent"]
            }
        }),
        json!({
            "name": "list_capabilities",
            "description": "Visible agents, integrations, and the runbook catalogue with param schemas.",
            "inputSchema": {"type": "object", "properties": {}}
        }),
        json!({
            "name": "health_check",
            "description": "Fan out across all applicable runbooks, returning severity-sorted findings.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "agent": {"type": "string"},
                    "categories": {"type": "array", "items": {"type": "string"}}
                }
            }
        }),
        json!({
            "name": "query_logs",
            "description": "Query a log source (systemd, docker, nginx-access, nginx-error, or the audit store).",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "source": {"type": "string"},
                    "agent": {"type": "string"},
                    "params": {"type": "object"}
                },
                "required": ["source"]
            }
        }),
        json!({
            "name": "check_critical_path",
            "description": "Run a named critical path's steps in order, fanning each step's probes out in parallel.",
            "inputSchema": {
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }
        }),
    ]
}

/// Logs one `probe.invoked` audit row per probe call and, for API-key
/// auth, refreshes the key's `last-used` timestamp (§4.7: "every tool
/// that executes a probe ... updates the key's last-used timestamp").
/// The session's cached `AuthContext` is resolved once at `initialize`,
/// so this is the one place later calls still touch the key record.
fn audit_probe(runtime: &HubRuntime, auth: &AuthContext, probe: &str, agent: Option<&str>, response: &ProbeResponse) {
    let severity = match response.status {
        ProbeStatus::Success => AuditSeverity::Informational,
        ProbeStatus::Error | ProbeStatus::Timeout => AuditSeverity::Warning,
    };
    runtime.audit.log_custom(
        "probe.invoked",
        severity,
        Some(json!({
            "subject": auth.subject,
            "probe": probe,
            "agent": agent,
            "status": response.status,
            "duration_ms": response.duration_ms,
        })),
    );

    if auth.kind == AuthKind::ApiKey {
        if let Ok(key_id) = auth.subject.parse::<ApiKeyId>() {
            let persistence = runtime.persistence.clone();
            tokio::spawn(async move {
                let _ = persistence.touch_api_key_last_used(&key_id).await;
            });
        }
    }
}

fn str_arg<'a>(args: &'a Value, name: &str) -> Option<&'a str> {
    args.get(name).and_then(Value::as_str)
}

/// `probe{agent?, probe, params?}` (§4.7).
pub async fn probe(runtime: &HubRuntime, auth: &AuthContext, args: Value) -> ToolCallResult {
    let Some(probe_name) = str_arg(&args, "probe") else {
        return ToolCallResult::error("`probe` is required");
    };
    let agent = str_arg(&args, "agent");
    let params = args.get("params").cloned().unwrap_or(Value::Null);

    let capability = runtime.catalog.capability_of(probe_name);
    let decision = policy::evaluate_probe_access(&auth.policy, agent, probe_name, capability);
    if !decision.allowed {
        return ToolCallResult::error(format!("Access denied: {}", decision.reason.unwrap_or_default()));
    }

    match runtime.router.execute(probe_name, params, agent).await {
        Ok(response) => {
            audit_probe(runtime, auth, probe_name, agent, &response);
            ToolCallResult::json(serde_json::to_value(&response).unwrap_or(Value::Null))
        }
        Err(err) => err.into(),
    }
}

/// `diagnose{agent?, category, params?}` (§4.7): diagnostic runbooks take
/// priority over a pack's simple runbook of the same category name.
pub async fn diagnose(runtime: &HubRuntime, auth: &AuthContext, args: Value) -> ToolCallResult {
    let Some(category) = str_arg(&args, "category") else {
        return ToolCallResult::error("`category` is required");
    };
    let agent = str_arg(&args, "agent");
    let params = args.get("params").cloned().unwrap_or(Value::Null);

    if let Some(agent) = agent {
        let decision = policy::evaluate_agent_access(&auth.policy, agent);
        if !decision.allowed {
            return ToolCallResult::error(format!("Access denied: {}", decision.reason.unwrap_or_default()));
        }
    }

    if runtime.runbooks.get(category).is_some() {
        let connected_agents = connected_agent_names(runtime).await;
        return match runtime
            .runbooks
            .execute(category, params, &runtime.router, connected_agents, Some(&runtime.audit))
            .await
        {
            Ok(result) => {
                let source = runbook_source(runtime, &result);
                let mut value = serde_json::to_value(&result).unwrap_or(Value::Null);
                if let Some(object) = value.as_object_mut() {
                    object.insert("meta".to_string(), json!({ "source": source }));
                }
                ToolCallResult::json(value)
            }
            Err(err) => err.into(),
        };
    }

    match simple::execute(category, agent, &runtime.router, &runtime.catalog, Some(&runtime.audit)).await {
        Ok(result) => ToolCallResult::json(serde_json::to_value(&result).unwrap_or(Value::Null)),
        Err(err) => err.into(),
    }
}

/// Classifies a diagnostic runbook run as `"integration"` or `"agent"`
/// (§8 Scenario 5 `meta.source`), based on whether every probe it ran
/// resolved to an integration-backed pack rather than agent connectivity,
/// which can flap independently of which pack a probe belongs to.
fn runbook_source(runtime: &HubRuntime, result: &crate::runbook::diagnostic::DiagnosticRunbookResult) -> &'static str {
    let ran_any_integration_pack = result.probe_results.values().any(|response| {
        response
            .metadata
            .pack_name
            .as_deref()
            .is_some_and(|pack_name| runtime.catalog.is_integration_pack(pack_name))
    });
    if ran_any_integration_pack {
        "integration"
    } else {
        "agent"
    }
}

async fn connected_agent_names(runtime: &HubRuntime) -> Vec<String> {
    runtime
        .persistence
        .list_agents()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|a| a.status == crate::domain::agent::AgentStatus::Online)
        .map(|a| a.name)
        .collect()
}

fn agent_visible(auth: &AuthContext, name: &str) -> bool {
    policy::evaluate_agent_access(&auth.policy, name).allowed
}

/// `list_agents{}` (§4.7).
pub async fn list_agents(runtime: &HubRuntime, auth: &AuthContext, _args: Value) -> ToolCallResult {
    match runtime.persistence.list_agents().await {
        Ok(agents) => {
            let visible: Vec<_> = agents.into_iter().filter(|a| agent_visible(auth, &a.name)).collect();
            ToolCallResult::json(serde_json::to_value(&visible).unwrap_or(Value::Null))
        }
        Err(err) => err.into(),
    }
}

/// `agent_overview{agent}` (§4.7).
pub async fn agent_overview(runtime: &HubRuntime, auth: &AuthContext, args: Value) -> ToolCallResult {
    let Some(agent) = str_arg(&args, "agent") else {
        return ToolCallResult::error("`agent` is required");
    };
    let decision = policy::evaluate_agent_access(&auth.policy, agent);
    if !decision.allowed {
        return ToolCallResult::error(format!("Access denied: {}", decision.reason.unwrap_or_default()));
    }

    let record = match runtime.persistence.get_agent_by_name(agent).await {
        Ok(Some(record)) => record,
        Ok(None) => return ToolCallResult::error(format!("agent '{agent}' is unknown")),
        Err(err) => return err.into(),
    };
    let connected = runtime.registry.resolve(agent).map(|h| h.is_online()).unwrap_or(false);

    ToolCallResult::json(json!({
        "agent": record,
        "connected": connected,
    }))
}

/// `list_capabilities{}` (§4.7): visible agents, integrations, and the
/// runbook catalogue, each carrying the param schemas a caller needs to
/// build a valid `probe`/`diagnose` call.
pub async fn list_capabilities(runtime: &HubRuntime, auth: &AuthContext, _args: Value) -> ToolCallResult {
    let agents = runtime
        .persistence
        .list_agents()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|a| agent_visible(auth, &a.name))
        .map(|a| json!({"name": a.name, "status": a.status, "packs": a.packs}))
        .collect::<Vec<_>>();

    let integrations = runtime
        .persistence
        .list_integrations()
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|i| json!({"id": i.id, "name": i.name, "type": i.integration_type, "status": i.status}))
        .collect::<Vec<_>>();

    let packs = runtime
        .catalog
        .list()
        .into_iter()
        .map(|p| json!({"name": p.name, "version": p.version, "probes": p.probes, "runbook": p.runbook}))
        .collect::<Vec<_>>();

    let diagnostic_categories = runtime.runbooks.categories();

    ToolCallResult::json(json!({
        "agents": agents,
        "integrations": integrations,
        "packs": packs,
        "diagnostic_runbooks": diagnostic_categories,
    }))
}

/// `health_check{agent?, categories?}` (§4.7): runs every applicable
/// simple and diagnostic runbook in parallel and merges the findings,
/// sorted by severity.
pub async fn health_check(runtime: &HubRuntime, auth: &AuthContext, args: Value) -> ToolCallResult {
    let agent = str_arg(&args, "agent");
    if let Some(agent) = agent {
        let decision = policy::evaluate_agent_access(&auth.policy, agent);
        if !decision.allowed {
            return ToolCallResult::error(format!("Access denied: {}", decision.reason.unwrap_or_default()));
        }
    }

    let requested: Option<Vec<String>> = args
        .get("categories")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect());

    let diagnostic_categories: Vec<String> = match &requested {
        Some(list) => list
            .iter()
            .filter(|c| runtime.runbooks.get(c).is_some())
            .cloned()
            .collect(),
        None => runtime.runbooks.categories(),
    };

    let connected_agents = connected_agent_names(runtime).await;

    let diagnostic_futures = diagnostic_categories.into_iter().map(|category| {
        let connected_agents = connected_agents.clone();
        async move {
            let result = runtime
                .runbooks
                .execute(&category, Value::Null, &runtime.router, connected_agents, Some(&runtime.audit))
                .await;
            (category, result)
        }
    });

    let pack_categories: Vec<String> = runtime
        .catalog
        .list()
        .into_iter()
        .filter_map(|p| p.runbook.map(|r| r.category))
        .filter(|c| requested.as_ref().is_none_or(|list| list.contains(c)))
        .collect();

    let simple_futures = pack_categories.into_iter().map(|category| async move {
        let result = simple::execute(&category, agent, &runtime.router, &runtime.catalog, Some(&runtime.audit)).await;
        (category, result)
    });

    let (diagnostic_results, simple_results) =
        futures::join!(futures::future::join_all(diagnostic_futures), futures::future::join_all(simple_futures));

    let mut findings = Vec::new();
    let mut ran = Vec::new();

    for (category, result) in diagnostic_results {
        if let Ok(result) = result {
            ran.push(category);
            findings.extend(result.findings);
        }
    }

    let mut simple_summaries = Vec::new();
    for (category, result) in simple_results {
        if let Ok(result) = result {
            ran.push(category.clone());
            simple_summaries.push(json!({"category": category, "summary": result.summary, "findings": result.findings}));
        }
    }

    crate::runbook::sort_by_severity(&mut findings);

    ToolCallResult::json(json!({
        "runbooks_run": ran,
        "findings": findings,
        "simple_runbook_results": simple_summaries,
    }))
}

fn logs_probe_for_source(source: &str) -> Option<&'static str> {
    match source {
        "systemd" => Some("systemd.journal.query"),
        "docker" => Some("docker.logs.tail"),
        "nginx-access" => Some("nginx.access.log.tail"),
        "nginx-error" => Some("nginx.error.log.tail"),
        _ => None,
    }
}

/// `query_logs{source, agent?, params?}` (§4.7).
pub async fn query_logs(runtime: &HubRuntime, auth: &AuthContext, args: Value) -> ToolCallResult {
    let Some(source) = str_arg(&args, "source") else {
        return ToolCallResult::error("`source` is required");
    };
    let agent = str_arg(&args, "agent");
    let params = args.get("params").cloned().unwrap_or(Value::Null);

    if source == "audit" {
        if !auth.has_role(crate::auth::Role::Admin) {
            return ToolCallResult::error("Access denied: querying the audit store requires the admin role");
        }
        let limit = params.get("limit").and_then(Value::as_u64).unwrap_or(100) as usize;
        return match runtime.persistence.list_audit(limit).await {
            Ok(events) => ToolCallResult::json(serde_json::to_value(&events).unwrap_or(Value::Null)),
            Err(err) => err.into(),
        };
    }

    let Some(probe_name) = logs_probe_for_source(source) else {
        return ToolCallResult::error(format!("unknown log source '{source}'"));
    };

    let capability = runtime.catalog.capability_of(probe_name);
    let decision = policy::evaluate_probe_access(&auth.policy, agent, probe_name, capability);
    if !decision.allowed {
        return ToolCallResult::error(format!("Access denied: {}", decision.reason.unwrap_or_default()));
    }

    match runtime.router.execute(probe_name, params, agent).await {
        Ok(response) => {
            audit_probe(runtime, auth, probe_name, agent, &response);
            ToolCallResult::json(serde_json::to_value(&response).unwrap_or(Value::Null))
        }
        Err(err) => err.into(),
    }
}

/// `check_critical_path{path}` (§4.7): runs a named path's steps in
/// order, fanning each step's probes out in parallel. Integration-typed
/// steps pass `agent: None` through to the router, which resolves the
/// integration from the probe's own pack prefix rather than from
/// `target_id` — `target_id` still identifies which integration a step is
/// documenting, it just isn't a second routing input (see DESIGN.md).
pub async fn check_critical_path(runtime: &HubRuntime, auth: &AuthContext, args: Value) -> ToolCallResult {
    let Some(path_name) = str_arg(&args, "path") else {
        return ToolCallResult::error("`path` is required");
    };

    let path = match runtime.persistence.get_critical_path_by_name(path_name).await {
        Ok(Some(path)) => path,
        Ok(None) => return ToolCallResult::error(format!("critical path '{path_name}' is unknown")),
        Err(err) => return err.into(),
    };

    let mut step_results = Vec::with_capacity(path.steps.len());
    let mut overall_pass = 0usize;
    let mut overall_fail = 0usize;

    for step in &path.steps {
        let agent = match step.target_type {
            crate::domain::critical_path::CriticalPathTarget::Agent => Some(step.target_id.as_str()),
            crate::domain::critical_path::CriticalPathTarget::Integration => None,
        };

        if let Some(agent) = agent {
            let decision = policy::evaluate_agent_access(&auth.policy, agent);
            if !decision.allowed {
                return ToolCallResult::error(format!("Access denied: {}", decision.reason.unwrap_or_default()));
            }
        }

        let futures = step.probes.iter().map(|probe| async move {
            let response = runtime.router.execute(probe, Value::Null, agent).await;
            (probe.clone(), response)
        });
        let results: Vec<(String, crate::error::Result<ProbeResponse>)> = futures::future::join_all(futures).await;

        let mut succeeded = 0usize;
        let mut probe_values = Vec::with_capacity(results.len());
        for (probe, result) in results {
            match result {
                Ok(response) => {
                    audit_probe(runtime, auth, &probe, agent, &response);
                    if response.status == ProbeStatus::Success {
                        succeeded += 1;
                    }
                    probe_values.push(json!({"probe": probe, "response": response}));
                }
                Err(err) => {
                    probe_values.push(json!({"probe": probe, "error": err.as_mcp_message()}));
                }
            }
        }

        let total = step.probes.len().max(1);
        let status = if succeeded == total {
            overall_pass += 1;
            "pass"
        } else if succeeded == 0 {
            overall_fail += 1;
            "fail"
        } else {
            "partial"
        };

        step_results.push(json!({
            "label": step.label,
            "status": status,
            "probes": probe_values,
        }));
    }

    let overall = if overall_fail == 0 && overall_pass == path.steps.len() {
        "pass"
    } else if overall_pass == 0 {
        "fail"
    } else {
        "partial"
    };

    ToolCallResult::json(json!({
        "path": path.name,
        "status": overall,
        "steps": step_results,
    }))
}

/// Dispatches a `tools/call` request by name.
pub async fn call(runtime: &HubRuntime, auth: &AuthContext, name: &str, args: Value) -> ToolCallResult {
    match name {
        "probe" => probe(runtime, auth, args).await,
        "diagnose" => diagnose(runtime, auth, args).await,
        "list_agents" => list_agents(runtime, auth, args).await,
        "agent_overview" => agent_overview(runtime, auth, args).await,
        "list_capabilities" => list_capabilities(runtime, auth, args).await,
        "health_check" => health_check(runtime, auth, args).await,
        "query_logs" => query_logs(runtime, auth, args).await,
        "check_critical_path" => check_critical_path(runtime, auth, args).await,
        other => ToolCallResult::error(format!("unknown tool '{other}'")),
    }
}
