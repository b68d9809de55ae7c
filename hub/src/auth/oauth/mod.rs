//! OAuth2 surfaces this hub needs (§4.8): a client-side provider for
//! dashboard login via Entra SSO, and a self-hosted PKCE authorization
//! server for MCP clients — this hub never federates MCP auth to a
//! third party, it issues its own codes/tokens.
//!
//! ```rust,ignore
//! use sonde_hub::auth::oauth::{EntraProvider, EntraConfig, OAuthProvider};
//!
//! let provider = EntraProvider::new(EntraConfig {
//!     tenant_id: "...".to_string(),
//!     client_id: "...".to_string(),
//!     client_secret: "...".to_string(),
//!     redirect_uri: "https://hub.example.com/auth/entra/callback".to_string(),
//!     admin_group_id: None,
//! })?;
//! let auth_url = provider.authorization_url("state-value", &[]);
//! ```

pub mod entra;
pub mod pkce;
pub mod provider;
pub mod state;

pub use entra::{EntraConfig, EntraProvider};
pub use pkce::{AccessTokenGrant, CodeChallengeMethod, McpAuthorizationServer, ValidatedToken};
pub use provider::{OAuthProvider, OAuthTokens, OAuthUserInfo};
pub use state::{generate_state, DashMapOAuthStateManager, OAuthStateManager, StateData};
