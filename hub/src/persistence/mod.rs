//! Persistence port (spec §4.1): the narrow interface the core calls for
//! agent records, API keys, audit rows, integration blobs, and critical
//! paths. This is the *only* seam where storage details — blob
//! encryption, key hashing, schema — are encapsulated; every component
//! above this line talks only to [`PersistencePort`].

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;

use crate::audit::event::AuditEvent;
use crate::domain::{Agent, ApiKeyRecord, CriticalPath, Integration};
use crate::error::Result;
use crate::ids::{AgentId, ApiKeyId, CriticalPathId, IntegrationId};

pub use memory::MemoryPersistence;
pub use sqlite::SqlitePersistence;

/// A logged integration call (§6 `integration_events`), recorded by the
/// integration executor on every attempt for post-hoc debugging of
/// retries/OAuth refreshes.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct IntegrationEvent {
    pub integration_id: IntegrationId,
    pub probe: String,
    pub attempt: u32,
    pub outcome: String,
    pub error_name: Option<String>,
    pub cause_name: Option<String>,
    pub cause_code: Option<String>,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

/// Async trait so both the production `SqlitePersistence` and the
/// in-memory test double `MemoryPersistence` can be passed to any
/// component by trait object, matching the teacher's "test handler logic
/// against fakes rather than a live database" pattern.
#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn get_agent(&self, id: &AgentId) -> Result<Option<Agent>>;
    async fn get_agent_by_name(&self, name: &str) -> Result<Option<Agent>>;
    async fn list_agents(&self) -> Result<Vec<Agent>>;
    /// Inserts a new agent or overwrites the record at `agent.id`.
    async fn put_agent(&self, agent: Agent) -> Result<()>;

    async fn get_api_key_by_hash(&self, hash: &str) -> Result<Option<ApiKeyRecord>>;
    async fn list_api_keys(&self) -> Result<Vec<ApiKeyRecord>>;
    async fn put_api_key(&self, key: ApiKeyRecord) -> Result<()>;
    async fn touch_api_key_last_used(&self, id: &ApiKeyId) -> Result<()>;

    async fn get_integration(&self, id: &IntegrationId) -> Result<Option<Integration>>;
    async fn list_integrations(&self) -> Result<Vec<Integration>>;
    async fn put_integration(&self, integration: Integration) -> Result<()>;

    async fn get_critical_path(&self, id: &CriticalPathId) -> Result<Option<CriticalPath>>;
    async fn get_critical_path_by_name(&self, name: &str) -> Result<Option<CriticalPath>>;
    async fn list_critical_paths(&self) -> Result<Vec<CriticalPath>>;

    async fn append_audit(&self, event: AuditEvent) -> Result<()>;
    async fn list_audit(&self, limit: usize) -> Result<Vec<AuditEvent>>;

    async fn append_integration_event(&self, event: IntegrationEvent) -> Result<()>;
}
