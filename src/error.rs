use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cap for remote error bodies carried in `RemoteError`.
pub const REMOTE_EXCERPT_CHARS: usize = 300;
/// Cap for raw bodies carried in `UnparseableEnvelope`.
pub const ENVELOPE_EXCERPT_CHARS: usize = 500;

/// Failures of a single round trip to the CRM tool server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("remote rejected the bearer token (HTTP 401)")]
    AuthExpired,
    #[error("remote denied access to this scope (HTTP 403)")]
    PermissionDenied,
    #[error("remote returned HTTP {status}: {excerpt}")]
    RemoteError { status: u16, excerpt: String },
    #[error("remote returned JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("remote did not answer within the timeout budget")]
    Timeout,
    #[error("response envelope could not be decoded: {excerpt}")]
    UnparseableEnvelope { excerpt: String },
    #[error("connection to remote failed: {0}")]
    Connection(String),
    #[error("request could not be built: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    pub fn remote(status: u16, body: &str) -> Self {
        TransportError::RemoteError {
            status,
            excerpt: truncate_chars(body, REMOTE_EXCERPT_CHARS),
        }
    }

    pub fn unparseable(raw: &str) -> Self {
        TransportError::UnparseableEnvelope {
            excerpt: truncate_chars(raw, ENVELOPE_EXCERPT_CHARS),
        }
    }

    pub fn category(&self) -> FailureCategory {
        match self {
            TransportError::AuthExpired => FailureCategory::AuthExpired,
            TransportError::PermissionDenied => FailureCategory::PermissionDenied,
            TransportError::RemoteError { .. } | TransportError::Rpc { .. } => FailureCategory::RemoteError,
            TransportError::Timeout => FailureCategory::Timeout,
            TransportError::UnparseableEnvelope { .. } => FailureCategory::UnparseableEnvelope,
            TransportError::Connection(_) => FailureCategory::Connection,
            TransportError::InvalidRequest(_) => FailureCategory::Configuration,
        }
    }

    /// Diagnostic text safe to relay upstream, already truncated.
    pub fn details(&self) -> Option<String> {
        match self {
            TransportError::RemoteError { excerpt, .. } | TransportError::UnparseableEnvelope { excerpt } => {
                Some(excerpt.clone())
            }
            TransportError::Rpc { message, .. } => Some(truncate_chars(message, REMOTE_EXCERPT_CHARS)),
            _ => None,
        }
    }
}

/// Errors crossing the library boundary that are not per-call tool failures.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("session '{session_id}' not found for tenant '{tenant_id}'")]
    SessionNotFound { tenant_id: String, session_id: String },
    #[error("session '{session_id}' already exists for tenant '{tenant_id}'")]
    SessionExists { tenant_id: String, session_id: String },
    #[error("store error: {0}")]
    Store(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<rusqlite::Error> for BridgeError {
    fn from(value: rusqlite::Error) -> Self {
        BridgeError::Store(value.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(value: serde_json::Error) -> Self {
        BridgeError::Store(value.to_string())
    }
}

/// Coarse failure kinds handed back to the agent layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    NotConnected,
    AuthExpired,
    PermissionDenied,
    RemoteError,
    Timeout,
    UnparseableEnvelope,
    Connection,
    UnknownTool,
    InvalidArguments,
    Configuration,
}

impl FailureCategory {
    pub fn user_message(self) -> &'static str {
        match self {
            FailureCategory::NotConnected => "CRM not connected. Please link your CRM account first.",
            FailureCategory::AuthExpired => "CRM authentication expired. Please reconnect your account.",
            FailureCategory::PermissionDenied => {
                "Permission denied. Check the scopes granted to your CRM integration."
            }
            FailureCategory::RemoteError => "The CRM could not complete this request.",
            FailureCategory::Timeout => "The CRM took too long to respond. Try again.",
            FailureCategory::UnparseableEnvelope => "The CRM sent a response that could not be read.",
            FailureCategory::Connection => "Could not reach the CRM.",
            FailureCategory::UnknownTool => "That CRM tool is not available for this account.",
            FailureCategory::InvalidArguments => "The tool was called with invalid arguments.",
            FailureCategory::Configuration => "The CRM connection is misconfigured.",
        }
    }
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((idx, _)) => {
            let mut out = s[..idx].to_string();
            out.push('…');
            out
        }
    }
}
