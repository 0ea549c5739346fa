pub mod envelope;
pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::error::TransportError;
use crate::models::credentials::CredentialBundle;
use crate::models::tool::ToolDefinition;

pub use http::HttpTransport;

pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// One round trip to the CRM tool server. Credentials are passed per call;
/// implementations must not retain them.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(
        &self,
        tool_name: &str,
        arguments: Value,
        credentials: &CredentialBundle,
        timeout: Duration,
    ) -> Result<Value, TransportError>;

    async fn list_tools(
        &self,
        credentials: &CredentialBundle,
        timeout: Duration,
    ) -> Result<Vec<ToolDefinition>, TransportError>;
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn tools_list() -> Self {
        Self {
            jsonrpc: "2.0",
            id: 1,
            method: METHOD_TOOLS_LIST,
            params: serde_json::json!({}),
        }
    }

    pub fn tools_call(name: &str, arguments: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: 1,
            method: METHOD_TOOLS_CALL,
            params: serde_json::json!({ "name": name, "arguments": arguments }),
        }
    }
}
