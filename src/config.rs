use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

pub const DEFAULT_ENDPOINT: &str = "https://services.leadconnectorhq.com/mcp/";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Header carrying the tenant scope id alongside the bearer token.
    #[serde(default = "default_scope_header")]
    pub scope_header: String,
    #[serde(default = "default_tool_name_prefix")]
    pub tool_name_prefix: String,
    /// Exact remote tool names to expose; `None` exposes everything.
    #[serde(default)]
    pub tool_filter: Option<Vec<String>>,
    /// Single-tenant development mode: credentials may come from the environment.
    #[serde(default)]
    pub dev_mode: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
            scope_header: default_scope_header(),
            tool_name_prefix: default_tool_name_prefix(),
            tool_filter: None,
            dev_mode: false,
        }
    }
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self, BridgeError> {
        let mut cfg = Self::default();
        if let Some(endpoint) = env_non_empty("CRM_MCP_URL") {
            cfg.endpoint = endpoint;
        }
        if let Some(raw) = env_non_empty("CRM_TIMEOUT_SECS") {
            cfg.timeout_secs = raw
                .parse()
                .map_err(|_| BridgeError::Configuration(format!("CRM_TIMEOUT_SECS is not a number: '{raw}'")))?;
        }
        if let Some(header) = env_non_empty("CRM_SCOPE_HEADER") {
            cfg.scope_header = header;
        }
        if let Ok(prefix) = std::env::var("CRM_TOOL_PREFIX") {
            cfg.tool_name_prefix = prefix.trim().to_string();
        }
        if let Some(raw) = env_non_empty("CRM_TOOL_FILTER") {
            cfg.tool_filter = Some(parse_list(&raw));
        }
        if let Some(raw) = env_non_empty("CRM_DEV_MODE") {
            cfg.dev_mode = matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        let url = url::Url::parse(&self.endpoint)
            .map_err(|e| BridgeError::Configuration(format!("invalid endpoint '{}': {e}", self.endpoint)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(BridgeError::Configuration(format!(
                "endpoint must be http(s), got '{}'",
                url.scheme()
            )));
        }
        if self.timeout_secs == 0 {
            return Err(BridgeError::Configuration("timeout_secs must be positive".to_string()));
        }
        if self.scope_header.trim().is_empty() {
            return Err(BridgeError::Configuration("scope_header must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_scope_header() -> String {
    "locationId".to_string()
}

fn default_tool_name_prefix() -> String {
    "crm".to_string()
}
