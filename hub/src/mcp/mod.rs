//! StreamableHTTP MCP transport (spec §4.7): one `/mcp` route serving a
//! hand-rolled JSON-RPC 2.0 dialect over a small, fixed tool set.

pub mod handler;
pub mod jsonrpc;
pub mod session;
pub mod tools;

pub use session::{McpSession, McpSessionId};
