use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{BridgeError, TransportError};
use crate::models::credentials::CredentialBundle;
use crate::tools::dispatcher::{BoundTool, RemoteTool};
use crate::transport::Transport;

/// Remote tools for one credential set, fetched once and cached.
///
/// The cache is write-once-then-read: concurrent first calls may both fetch,
/// and whichever finishes last is kept. Both results describe the same
/// remote schema.
pub struct ToolCatalog {
    transport: Arc<dyn Transport>,
    credentials: CredentialBundle,
    allow_list: Option<HashSet<String>>,
    name_prefix: String,
    timeout: Duration,
    cache: RwLock<Option<Arc<[BoundTool]>>>,
}

impl ToolCatalog {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: CredentialBundle,
        timeout: Duration,
    ) -> Result<Self, BridgeError> {
        credentials.ensure_complete()?;
        Ok(Self {
            transport,
            credentials,
            allow_list: None,
            name_prefix: String::new(),
            timeout,
            cache: RwLock::new(None),
        })
    }

    /// Restricts the catalog to these exact remote tool names.
    pub fn with_allow_list(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.allow_list = Some(names.into_iter().collect());
        self
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn credentials(&self) -> &CredentialBundle {
        &self.credentials
    }

    pub async fn get_tools(&self) -> Result<Arc<[BoundTool]>, TransportError> {
        if let Some(tools) = self.cache.read().await.as_ref() {
            return Ok(Arc::clone(tools));
        }

        let definitions = self.transport.list_tools(&self.credentials, self.timeout).await?;
        let fetched = definitions.len();

        let mut tools = Vec::with_capacity(fetched);
        for def in definitions {
            if let Some(allow) = &self.allow_list {
                if !allow.contains(&def.name) {
                    continue;
                }
            }
            let remote = Arc::new(RemoteTool::new(def, &self.name_prefix));
            tools.push(BoundTool::from_validated(remote, self.credentials.clone(), Arc::clone(&self.transport), self.timeout));
        }

        info!(
            scope_id = self.credentials.scope_id(),
            fetched,
            exposed = tools.len(),
            "loaded CRM tool catalog"
        );

        let tools: Arc<[BoundTool]> = tools.into();
        *self.cache.write().await = Some(Arc::clone(&tools));
        Ok(tools)
    }

    /// Looks a tool up by remote or function name.
    pub async fn find(&self, name: &str) -> Result<Option<BoundTool>, TransportError> {
        let tools = self.get_tools().await?;
        Ok(tools.iter().find(|t| t.remote_tool().answers_to(name)).cloned())
    }

    /// Drops the cache; the next `get_tools` refetches.
    pub async fn close(&self) {
        debug!(scope_id = self.credentials.scope_id(), "clearing CRM tool catalog");
        *self.cache.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tool::ToolDefinition;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingLister {
        list_calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for CountingLister {
        async fn call(
            &self,
            _tool_name: &str,
            _arguments: Value,
            _credentials: &CredentialBundle,
            _timeout: Duration,
        ) -> Result<Value, TransportError> {
            Ok(Value::Null)
        }

        async fn list_tools(
            &self,
            _credentials: &CredentialBundle,
            _timeout: Duration,
        ) -> Result<Vec<ToolDefinition>, TransportError> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(["contacts_get-contact", "contacts_add-tags", "locations_get-location"]
                .into_iter()
                .map(|name| ToolDefinition {
                    name: name.to_string(),
                    description: format!("{name} description"),
                    input_schema: json!({ "type": "object", "properties": {} }),
                })
                .collect())
        }
    }

    fn catalog(transport: Arc<CountingLister>) -> ToolCatalog {
        ToolCatalog::new(transport, CredentialBundle::new("tok", "loc"), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let transport = Arc::new(CountingLister::default());
        let catalog = catalog(transport.clone());

        let first = catalog.get_tools().await.unwrap();
        let second = catalog.get_tools().await.unwrap();
        assert_eq!(first.len(), 3);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(transport.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_forces_refetch() {
        let transport = Arc::new(CountingLister::default());
        let catalog = catalog(transport.clone());

        catalog.get_tools().await.unwrap();
        catalog.close().await;
        let again = catalog.get_tools().await.unwrap();
        assert_eq!(again.len(), 3);
        assert_eq!(transport.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn allow_list_filters_by_exact_name() {
        let transport = Arc::new(CountingLister::default());
        let catalog = catalog(transport.clone())
            .with_allow_list(["contacts_get-contact".to_string(), "contacts".to_string()]);

        let tools = catalog.get_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].remote_name(), "contacts_get-contact");
        catalog.get_tools().await.unwrap();
        assert_eq!(transport.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn find_accepts_remote_or_function_name() {
        let catalog = catalog(Arc::new(CountingLister::default())).with_name_prefix("crm");
        assert!(catalog.find("contacts_add-tags").await.unwrap().is_some());
        assert!(catalog.find("crm_contacts_add_tags").await.unwrap().is_some());
        assert!(catalog.find("contacts_remove-tags").await.unwrap().is_none());
    }

    #[test]
    fn incomplete_credentials_fail_before_any_fetch() {
        let transport = Arc::new(CountingLister::default());
        for creds in [CredentialBundle::new("", "loc"), CredentialBundle::new("tok", " ")] {
            let result = ToolCatalog::new(transport.clone(), creds, Duration::from_secs(5));
            assert!(matches!(result, Err(BridgeError::Configuration(_))));
        }
        assert_eq!(transport.list_calls.load(Ordering::SeqCst), 0);
    }
}
