use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FailureCategory, TransportError};

/// A capability declared by the remote `tools/list` method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema", alias = "input_schema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub category: FailureCategory,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ToolFailure {
    pub fn new(category: FailureCategory, details: Option<String>) -> Self {
        Self {
            category,
            message: category.user_message().to_string(),
            details,
        }
    }
}

impl From<&TransportError> for ToolFailure {
    fn from(err: &TransportError) -> Self {
        ToolFailure::new(err.category(), err.details())
    }
}

/// Outcome of one dispatched call, returned to the agent layer as data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub ok: bool,
    pub output: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl ToolResult {
    pub fn success(tool_name: &str, output: Value, duration_ms: Option<u64>) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            ok: true,
            output,
            error: None,
            duration_ms,
        }
    }

    pub fn failure(tool_name: &str, failure: ToolFailure, duration_ms: Option<u64>) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            ok: false,
            output: serde_json::json!({}),
            error: Some(failure),
            duration_ms,
        }
    }

    pub fn not_connected(tool_name: &str) -> Self {
        Self::failure(tool_name, ToolFailure::new(FailureCategory::NotConnected, None), None)
    }

    pub fn category(&self) -> Option<FailureCategory> {
        self.error.as_ref().map(|e| e.category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_reads_camel_case_input_schema() {
        let def: ToolDefinition = serde_json::from_value(serde_json::json!({
            "name": "contacts_get-contact",
            "inputSchema": { "type": "object", "properties": { "path_contactId": { "type": "string" } } }
        }))
        .unwrap();
        assert_eq!(def.name, "contacts_get-contact");
        assert_eq!(def.description, "");
        assert_eq!(def.input_schema["properties"]["path_contactId"]["type"], "string");
    }

    #[test]
    fn failure_from_transport_error_keeps_excerpt() {
        let err = TransportError::remote(502, "upstream exploded");
        let failure = ToolFailure::from(&err);
        assert_eq!(failure.category, FailureCategory::RemoteError);
        assert_eq!(failure.details.as_deref(), Some("upstream exploded"));
        assert_eq!(failure.message, FailureCategory::RemoteError.user_message());
    }

    #[test]
    fn failure_result_serializes_without_output_noise() {
        let result = ToolResult::not_connected("contacts_get-contacts");
        let v = serde_json::to_value(&result).unwrap();
        assert_eq!(v["ok"], false);
        assert_eq!(v["error"]["category"], "not_connected");
        assert!(v.get("duration_ms").is_none());
    }
}
