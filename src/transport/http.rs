use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, TransportError};
use crate::models::credentials::CredentialBundle;
use crate::models::tool::ToolDefinition;
use crate::transport::envelope;
use crate::transport::{JsonRpcRequest, Transport};

const ACCEPT_BOTH: &str = "application/json, text/event-stream";

/// JSON-RPC over HTTP POST against the fixed CRM endpoint.
///
/// The client carries no default auth headers; every request gets the
/// caller's credentials.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    scope_header: HeaderName,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, scope_header: &str) -> Result<Self, BridgeError> {
        let scope_header = HeaderName::from_bytes(scope_header.as_bytes())
            .map_err(|e| BridgeError::Configuration(format!("invalid scope header '{scope_header}': {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_BOTH));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| BridgeError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            scope_header,
        })
    }

    pub fn from_config(cfg: &BridgeConfig) -> Result<Self, BridgeError> {
        cfg.validate()?;
        Self::new(cfg.endpoint.clone(), &cfg.scope_header)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn auth_headers(&self, credentials: &CredentialBundle) -> Result<HeaderMap, TransportError> {
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", credentials.token()))
            .map_err(|_| TransportError::InvalidRequest("token is not a valid header value".to_string()))?;
        bearer.set_sensitive(true);
        let scope = HeaderValue::from_str(credentials.scope_id())
            .map_err(|_| TransportError::InvalidRequest("scope id is not a valid header value".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(self.scope_header.clone(), scope);
        Ok(headers)
    }

    /// POSTs one envelope and returns the raw 2xx body.
    async fn post(
        &self,
        request: &JsonRpcRequest,
        credentials: &CredentialBundle,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        let headers = self.auth_headers(credentials)?;
        debug!(
            method = request.method,
            scope_id = credentials.scope_id(),
            endpoint = %self.endpoint,
            "sending CRM request"
        );

        let exchange = async {
            let resp = self
                .client
                .post(&self.endpoint)
                .headers(headers)
                .json(request)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                // Body is only an excerpt here; the status decides the error.
                let text = resp.text().await.unwrap_or_default();
                return Ok((status, text));
            }
            let text = resp.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        };

        let (status, text) = match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(res)) => res,
            Ok(Err(e)) if e.is_timeout() => return Err(TransportError::Timeout),
            Ok(Err(e)) => return Err(TransportError::Connection(e.without_url().to_string())),
            Err(_) => return Err(TransportError::Timeout),
        };

        if !status.is_success() {
            let err = classify_status(status, &text);
            warn!(method = request.method, status = status.as_u16(), "CRM request failed");
            return Err(err);
        }
        Ok(text)
    }
}

pub(crate) fn classify_status(status: StatusCode, body: &str) -> TransportError {
    match status {
        StatusCode::UNAUTHORIZED => TransportError::AuthExpired,
        StatusCode::FORBIDDEN => TransportError::PermissionDenied,
        other => TransportError::remote(other.as_u16(), body),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        tool_name: &str,
        arguments: Value,
        credentials: &CredentialBundle,
        timeout: Duration,
    ) -> Result<Value, TransportError> {
        let request = JsonRpcRequest::tools_call(tool_name, arguments);
        let body = self.post(&request, credentials, timeout).await?;
        envelope::unwrap(&body)
    }

    async fn list_tools(
        &self,
        credentials: &CredentialBundle,
        timeout: Duration,
    ) -> Result<Vec<ToolDefinition>, TransportError> {
        let body = self.post(&JsonRpcRequest::tools_list(), credentials, timeout).await?;
        envelope::parse_tool_list(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_categories() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED, ""), TransportError::AuthExpired);
        assert_eq!(classify_status(StatusCode::FORBIDDEN, ""), TransportError::PermissionDenied);
        assert_eq!(
            classify_status(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            TransportError::RemoteError {
                status: 500,
                excerpt: "boom".to_string()
            }
        );
    }

    #[test]
    fn rejects_invalid_scope_header() {
        assert!(matches!(
            HttpTransport::new("http://localhost/mcp/", "bad header"),
            Err(BridgeError::Configuration(_))
        ));
    }

    #[test]
    fn header_unsafe_credentials_are_refused() {
        let transport = HttpTransport::new("http://localhost/mcp/", "locationId").unwrap();
        let creds = CredentialBundle::new("tok\nen", "loc");
        assert!(matches!(
            transport.auth_headers(&creds),
            Err(TransportError::InvalidRequest(_))
        ));
    }
}
