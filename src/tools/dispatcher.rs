use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{BridgeError, FailureCategory, TransportError};
use crate::models::credentials::CredentialBundle;
use crate::models::tool::{ToolDefinition, ToolFailure, ToolResult};
use crate::tools::schema::{self, CallSchema, FunctionDeclaration};
use crate::transport::Transport;

/// A remote tool definition with its translated schema and model-facing name.
/// Holds nothing tenant-specific.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTool {
    pub definition: ToolDefinition,
    pub function_name: String,
    pub schema: CallSchema,
}

impl RemoteTool {
    pub fn new(definition: ToolDefinition, prefix: &str) -> Self {
        let function_name = function_name(prefix, &definition.name);
        let schema = schema::translate(&definition.input_schema);
        Self {
            definition,
            function_name,
            schema,
        }
    }

    pub fn declaration(&self) -> FunctionDeclaration {
        let description = if self.definition.description.trim().is_empty() {
            format!("CRM tool: {}", self.definition.name)
        } else {
            self.definition.description.clone()
        };
        FunctionDeclaration {
            name: self.function_name.clone(),
            description,
            parameters: self.schema.clone(),
        }
    }

    pub fn answers_to(&self, name: &str) -> bool {
        self.definition.name == name || self.function_name == name
    }
}

/// `contacts_get-contact` -> `crm_contacts_get_contact`.
pub fn function_name(prefix: &str, remote_name: &str) -> String {
    let base: String = remote_name
        .chars()
        .map(|c| if c == '-' || c == '.' { '_' } else { c })
        .collect();
    let prefix = prefix.trim().trim_end_matches('_');
    if prefix.is_empty() {
        base
    } else {
        format!("{prefix}_{base}")
    }
}

/// One remote tool bound to one tenant's credentials.
///
/// Stateless between invocations; every failure comes back as a
/// `ToolResult` rather than an error.
#[derive(Clone)]
pub struct BoundTool {
    tool: Arc<RemoteTool>,
    credentials: CredentialBundle,
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl BoundTool {
    pub fn new(
        tool: Arc<RemoteTool>,
        credentials: CredentialBundle,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Result<Self, BridgeError> {
        credentials.ensure_complete()?;
        Ok(Self::from_validated(tool, credentials, transport, timeout))
    }

    /// For callers that already checked `credentials` for completeness.
    pub(crate) fn from_validated(
        tool: Arc<RemoteTool>,
        credentials: CredentialBundle,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Self {
        Self {
            tool,
            credentials,
            transport,
            timeout,
        }
    }

    pub fn remote_name(&self) -> &str {
        &self.tool.definition.name
    }

    pub fn function_name(&self) -> &str {
        &self.tool.function_name
    }

    pub fn remote_tool(&self) -> &Arc<RemoteTool> {
        &self.tool
    }

    pub fn declaration(&self) -> FunctionDeclaration {
        self.tool.declaration()
    }

    pub(crate) fn scope_id(&self) -> &str {
        self.credentials.scope_id()
    }

    pub async fn invoke(&self, arguments: Value) -> ToolResult {
        let name = self.remote_name();
        let args = match normalize_arguments(arguments) {
            Ok(args) => args,
            Err(reason) => {
                return ToolResult::failure(
                    name,
                    ToolFailure::new(FailureCategory::InvalidArguments, Some(reason)),
                    None,
                )
            }
        };

        let started = Instant::now();
        let outcome = self
            .transport
            .call(name, Value::Object(args), &self.credentials, self.timeout)
            .await;
        let duration_ms = started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;

        match outcome {
            Ok(output) => {
                debug!(tool = name, duration_ms, "CRM tool call succeeded");
                ToolResult::success(name, output, Some(duration_ms))
            }
            Err(err) => {
                log_failure(name, &err);
                ToolResult::failure(name, ToolFailure::from(&err), Some(duration_ms))
            }
        }
    }
}

fn log_failure(tool: &str, err: &TransportError) {
    match err {
        TransportError::UnparseableEnvelope { .. } => {
            warn!(target: "crm_bridge::protocol", tool, "CRM response envelope could not be decoded")
        }
        other => warn!(tool, category = ?other.category(), "CRM tool call failed"),
    }
}

fn timestamp_field() -> Option<&'static Regex> {
    static RX: OnceLock<Option<Regex>> = OnceLock::new();
    RX.get_or_init(|| Regex::new(r"(?i)(?:^|_)(?:start|end)_?time(?:stamp)?$").ok())
        .as_ref()
}

pub fn is_timestamp_field(name: &str) -> bool {
    timestamp_field().is_some_and(|rx| rx.is_match(name))
}

/// Accepts an argument object (or a JSON string of one, or null) and
/// stringifies numeric time-range boundaries.
pub fn normalize_arguments(arguments: Value) -> Result<Map<String, Value>, String> {
    let mut args = match arguments {
        Value::Null => Map::new(),
        Value::Object(map) => map,
        Value::String(raw) if raw.trim().is_empty() => Map::new(),
        Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => map,
            _ => return Err("arguments must be a JSON object".to_string()),
        },
        _ => return Err("arguments must be a JSON object".to_string()),
    };

    for (key, value) in args.iter_mut() {
        if !is_timestamp_field(key) {
            continue;
        }
        if let Value::Number(n) = value {
            let digits = match (n.as_i64(), n.as_u64(), n.as_f64()) {
                (Some(i), _, _) => i.to_string(),
                (None, Some(u), _) => u.to_string(),
                (None, None, Some(f)) => (f.trunc() as i64).to_string(),
                _ => continue,
            };
            *value = Value::String(digits);
        }
    }
    Ok(args)
}
