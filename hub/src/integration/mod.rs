//! Integration executor (spec §4.4): invokes in-process HTTP-based
//! integration handlers, retries transient failures, and refreshes OAuth2
//! tokens. The probe router (§4.5) delegates here whenever a probe's pack
//! prefix names a registered integration rather than an agent.

mod executor;
mod handler;
mod keeper;
mod retry;

pub use executor::Executor;
pub use handler::{GenericHttpHandler, HandlerContext, IntegrationHandler};
pub use keeper::{resolve_keeper_references, KeeperCache, KeeperClient};
pub use retry::{retry_with_backoff, RetryOutcome};
