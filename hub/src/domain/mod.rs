//! Core data model (spec §3): agents, packs, integrations, API keys,
//! critical paths. These are plain `serde` structs shared by every
//! component above the persistence line; the persistence port (§4.1)
//! is the only place that knows how they're stored.

pub mod agent;
pub mod api_key;
pub mod critical_path;
pub mod integration;
pub mod pack;

pub use agent::{Agent, AgentStatus};
pub use api_key::{ApiKeyPolicy, ApiKeyRecord};
pub use critical_path::{CriticalPath, CriticalPathStep, CriticalPathTarget};
pub use integration::{CredentialAuthMethod, Credentials, Integration, IntegrationStatus};
pub use pack::{CapabilityLevel, Pack, ProbeDefinition};
