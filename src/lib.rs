//! Multi-tenant bridge between an agent's tool calls and a CRM tool server
//! that speaks JSON-RPC 2.0 over HTTP with SSE-framed, string-nested replies.
//!
//! Flow: a session is created per `(tenant_id, session_id)` with the tenant's
//! credentials in its state; [`Bridge::invoke`] reads them back from that
//! session, binds them to the requested remote tool, and returns a
//! [`ToolResult`] whatever happens on the wire.

pub mod bridge;
pub mod config;
pub mod credentials;
pub mod error;
pub mod models;
pub mod session;
pub mod tools;
pub mod transport;

pub use bridge::Bridge;
pub use config::BridgeConfig;
pub use error::{BridgeError, FailureCategory, TransportError};
pub use models::credentials::CredentialBundle;
pub use models::tool::{ToolDefinition, ToolFailure, ToolResult};
