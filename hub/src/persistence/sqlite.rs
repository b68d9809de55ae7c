//! SQLite-backed `PersistencePort` (§4.1, §6). The schema (`agents`,
//! `api_keys`, `integrations`, `audit`, `critical_paths`,
//! `critical_path_steps`, `integration_events`, …) and its migrations are
//! out of scope for this crate (§1) — this module assumes the tables
//! already exist and only ever issues the narrow set of queries the core
//! needs, using runtime-checked `sqlx::query` (not the `query!` macro,
//! which would require a live `DATABASE_URL` at compile time).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::{IntegrationEvent, PersistencePort};
use crate::audit::event::AuditEvent;
use crate::domain::{Agent, ApiKeyRecord, CriticalPath, Integration};
use crate::error::{Error, Result};
use crate::ids::{AgentId, ApiKeyId, CriticalPathId, IntegrationId};

pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn connect(db_path: &str) -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&format!("sqlite://{db_path}?mode=rwc"))
            .await
            .map_err(|e| Error::Internal(format!("sqlite connect failed: {e}")))?;
        Ok(Self::new(pool))
    }

    pub async fn open(db_path: &str) -> Result<Self> {
        Self::connect(db_path).await
    }
}

fn row_to_agent(row: &sqlx::sqlite::SqliteRow) -> Result<Agent> {
    let id: String = row.try_get("id").map_err(sqlx_err)?;
    let name: String = row.try_get("name").map_err(sqlx_err)?;
    let os: String = row.try_get("os").map_err(sqlx_err)?;
    let agent_version: String = row.try_get("agent_version").map_err(sqlx_err)?;
    let packs_json: String = row.try_get("packs_json").map_err(sqlx_err)?;
    let last_seen: DateTime<Utc> = row.try_get("last_seen").map_err(sqlx_err)?;
    let status: String = row.try_get("status").map_err(sqlx_err)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(sqlx_err)?;

    Ok(Agent {
        id: id.parse().map_err(|_| Error::Internal("corrupt agent id in store".into()))?,
        name,
        os,
        agent_version,
        packs: serde_json::from_str(&packs_json).unwrap_or_default(),
        last_seen,
        status: serde_json::from_value(serde_json::Value::String(status))
            .map_err(|_| Error::Internal("corrupt agent status in store".into()))?,
        created_at,
    })
}

fn sqlx_err(e: sqlx::Error) -> Error {
    Error::Internal(format!("sqlite row decode failed: {e}"))
}

#[async_trait]
impl PersistencePort for SqlitePersistence {
    async fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn get_agent_by_name(&self, name: &str) -> Result<Option<Agent>> {
        let row = sqlx::query("SELECT * FROM agents WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        let rows = sqlx::query("SELECT * FROM agents ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;
        rows.iter().map(row_to_agent).collect()
    }

    async fn put_agent(&self, agent: Agent) -> Result<()> {
        let packs_json = serde_json::to_string(&agent.packs).unwrap_or_default();
        let status = serde_json::to_value(&agent.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| agent.status.to_string());
        sqlx::query(
            "INSERT INTO agents (id, name, os, agent_version, packs_json, last_seen, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name=excluded.name, os=excluded.os, agent_version=excluded.agent_version,
                packs_json=excluded.packs_json, last_seen=excluded.last_seen, status=excluded.status",
        )
        .bind(agent.id.as_str())
        .bind(&agent.name)
        .bind(&agent.os)
        .bind(&agent.agent_version)
        .bind(packs_json)
        .bind(agent.last_seen)
        .bind(status)
        .bind(agent.created_at)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        Ok(())
    }

    async fn get_api_key_by_hash(&self, hash: &str) -> Result<Option<ApiKeyRecord>> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE key_hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?;
        row.map(|r| row_to_api_key(&r)).transpose()
    }

    async fn list_api_keys(&self) -> Result<Vec<ApiKeyRecord>> {
        let rows = sqlx::query("SELECT * FROM api_keys ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;
        rows.iter().map(row_to_api_key).collect()
    }

    async fn put_api_key(&self, key: ApiKeyRecord) -> Result<()> {
        let policy_json = serde_json::to_string(&key.policy).unwrap_or_default();
        let role_json = serde_json::to_string(&key.role).unwrap_or_default();
        sqlx::query(
            "INSERT INTO api_keys (id, display_name, key_hash, role, policy_json, expires_at,
                revoked_at, created_by, last_used_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                display_name=excluded.display_name, role=excluded.role,
                policy_json=excluded.policy_json, revoked_at=excluded.revoked_at",
        )
        .bind(key.id.as_str())
        .bind(&key.display_name)
        .bind(&key.key_hash)
        .bind(role_json)
        .bind(policy_json)
        .bind(key.expires_at)
        .bind(key.revoked_at)
        .bind(&key.created_by)
        .bind(key.last_used_at)
        .bind(key.created_at)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        Ok(())
    }

    async fn touch_api_key_last_used(&self, id: &ApiKeyId) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        Ok(())
    }

    async fn get_integration(&self, id: &IntegrationId) -> Result<Option<Integration>> {
        let row = sqlx::query("SELECT * FROM integrations WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?;
        row.map(|r| row_to_integration(&r)).transpose()
    }

    async fn list_integrations(&self) -> Result<Vec<Integration>> {
        let rows = sqlx::query("SELECT * FROM integrations ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;
        rows.iter().map(row_to_integration).collect()
    }

    async fn put_integration(&self, integration: Integration) -> Result<()> {
        let config_json = serde_json::to_string(&integration.config).unwrap_or_default();
        let status = serde_json::to_value(&integration.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        sqlx::query(
            "INSERT INTO integrations (id, integration_type, name, config_json, status,
                last_test_result, last_test_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name=excluded.name, config_json=excluded.config_json, status=excluded.status,
                last_test_result=excluded.last_test_result, last_test_at=excluded.last_test_at",
        )
        .bind(integration.id.as_str())
        .bind(&integration.integration_type)
        .bind(&integration.name)
        .bind(config_json)
        .bind(status)
        .bind(&integration.last_test_result)
        .bind(integration.last_test_at)
        .bind(integration.created_at)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        Ok(())
    }

    async fn get_critical_path(&self, id: &CriticalPathId) -> Result<Option<CriticalPath>> {
        self.get_critical_path_where("id = ?", id.as_str()).await
    }

    async fn get_critical_path_by_name(&self, name: &str) -> Result<Option<CriticalPath>> {
        self.get_critical_path_where("name = ?", name).await
    }

    async fn list_critical_paths(&self) -> Result<Vec<CriticalPath>> {
        let rows = sqlx::query("SELECT id, name FROM critical_paths ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id").map_err(sqlx_err)?;
            if let Some(path) = self.get_critical_path_where("id = ?", &id).await? {
                out.push(path);
            }
        }
        Ok(out)
    }

    async fn append_audit(&self, event: AuditEvent) -> Result<()> {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        sqlx::query("INSERT INTO audit (id, sequence, payload_json, created_at) VALUES (?, ?, ?, ?)")
            .bind(event.id.to_string())
            .bind(event.sequence as i64)
            .bind(payload)
            .bind(event.timestamp)
            .execute(&self.pool)
            .await
            .map_err(sqlx_err)?;
        Ok(())
    }

    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query("SELECT payload_json FROM audit ORDER BY sequence DESC LIMIT ?")
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(sqlx_err)?;
        rows.into_iter()
            .map(|row| {
                let payload: String = row.try_get("payload_json").map_err(sqlx_err)?;
                serde_json::from_str(&payload).map_err(|e| Error::Internal(format!("corrupt audit row: {e}")))
            })
            .collect()
    }

    async fn append_integration_event(&self, event: IntegrationEvent) -> Result<()> {
        sqlx::query(
            "INSERT INTO integration_events
                (integration_id, probe, attempt, outcome, error_name, cause_name, cause_code, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.integration_id.as_str())
        .bind(&event.probe)
        .bind(event.attempt as i64)
        .bind(&event.outcome)
        .bind(&event.error_name)
        .bind(&event.cause_name)
        .bind(&event.cause_code)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(sqlx_err)?;
        Ok(())
    }
}

impl SqlitePersistence {
    async fn get_critical_path_where(&self, clause: &str, bind: &str) -> Result<Option<CriticalPath>> {
        let query = format!("SELECT id, name FROM critical_paths WHERE {clause}");
        let row = sqlx::query(&query)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(sqlx_err)?;
        let Some(row) = row else { return Ok(None) };
        let id: String = row.try_get("id").map_err(sqlx_err)?;
        let name: String = row.try_get("name").map_err(sqlx_err)?;

        let step_rows = sqlx::query(
            "SELECT label, target_type, target_id, probes_json FROM critical_path_steps
             WHERE critical_path_id = ? ORDER BY step_order",
        )
        .bind(&id)
        .fetch_all(&self.pool)
        .await
        .map_err(sqlx_err)?;

        let mut steps = Vec::with_capacity(step_rows.len());
        for step in step_rows {
            let label: String = step.try_get("label").map_err(sqlx_err)?;
            let target_type: String = step.try_get("target_type").map_err(sqlx_err)?;
            let target_id: String = step.try_get("target_id").map_err(sqlx_err)?;
            let probes_json: String = step.try_get("probes_json").map_err(sqlx_err)?;
            steps.push(crate::domain::critical_path::CriticalPathStep {
                label,
                target_type: serde_json::from_value(serde_json::Value::String(target_type))
                    .map_err(|_| Error::Internal("corrupt critical path step target_type".into()))?,
                target_id,
                probes: serde_json::from_str(&probes_json).unwrap_or_default(),
            });
        }

        Ok(Some(CriticalPath {
            id: id.parse().map_err(|_| Error::Internal("corrupt critical path id".into()))?,
            name,
            steps,
        }))
    }
}

fn row_to_api_key(row: &sqlx::sqlite::SqliteRow) -> Result<ApiKeyRecord> {
    let id: String = row.try_get("id").map_err(sqlx_err)?;
    let display_name: String = row.try_get("display_name").map_err(sqlx_err)?;
    let key_hash: String = row.try_get("key_hash").map_err(sqlx_err)?;
    let role_json: String = row.try_get("role").map_err(sqlx_err)?;
    let policy_json: String = row.try_get("policy_json").map_err(sqlx_err)?;

    Ok(ApiKeyRecord {
        id: id.parse().map_err(|_| Error::Internal("corrupt api key id".into()))?,
        display_name,
        key_hash,
        role: serde_json::from_str(&role_json).map_err(|_| Error::Internal("corrupt api key role".into()))?,
        policy: serde_json::from_str(&policy_json).unwrap_or_default(),
        expires_at: row.try_get("expires_at").map_err(sqlx_err)?,
        revoked_at: row.try_get("revoked_at").map_err(sqlx_err)?,
        created_by: row.try_get("created_by").map_err(sqlx_err)?,
        last_used_at: row.try_get("last_used_at").map_err(sqlx_err)?,
        created_at: row.try_get("created_at").map_err(sqlx_err)?,
    })
}

fn row_to_integration(row: &sqlx::sqlite::SqliteRow) -> Result<Integration> {
    let id: String = row.try_get("id").map_err(sqlx_err)?;
    let integration_type: String = row.try_get("integration_type").map_err(sqlx_err)?;
    let name: String = row.try_get("name").map_err(sqlx_err)?;
    let config_json: String = row.try_get("config_json").map_err(sqlx_err)?;
    let status: String = row.try_get("status").map_err(sqlx_err)?;

    Ok(Integration {
        id: id.parse().map_err(|_| Error::Internal("corrupt integration id".into()))?,
        integration_type,
        name,
        config: serde_json::from_str(&config_json)
            .map_err(|e| Error::Internal(format!("corrupt integration config: {e}")))?,
        status: serde_json::from_value(serde_json::Value::String(status))
            .map_err(|_| Error::Internal("corrupt integration status".into()))?,
        last_test_result: row.try_get("last_test_result").map_err(sqlx_err)?,
        last_test_at: row.try_get("last_test_at").map_err(sqlx_err)?,
        created_at: row.try_get("created_at").map_err(sqlx_err)?,
    })
}
