use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::BridgeConfig;
use crate::credentials::CredentialResolver;
use crate::error::{BridgeError, FailureCategory};
use crate::models::credentials::CredentialBundle;
use crate::models::session::SessionView;
use crate::models::tool::{ToolFailure, ToolResult};
use crate::session::{SessionCreated, SessionInjector, SessionStore};
use crate::tools::{FunctionDeclaration, ToolCatalog};
use crate::transport::{HttpTransport, Transport};

/// A catalog plus the sessions that have used it. The entry goes away with
/// its last session, taking the bound credentials with it.
struct CatalogEntry {
    catalog: Arc<ToolCatalog>,
    holders: HashSet<(String, String)>,
}

/// Entry point for the chat server: every operation is addressed by
/// `(tenant_id, session_id)` and reads credentials from that session only.
pub struct Bridge {
    config: BridgeConfig,
    transport: Arc<dyn Transport>,
    sessions: SessionInjector,
    catalogs: RwLock<HashMap<CredentialBundle, CatalogEntry>>,
}

impl Bridge {
    pub fn new(
        config: BridgeConfig,
        transport: Arc<dyn Transport>,
        resolver: Arc<dyn CredentialResolver>,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, BridgeError> {
        config.validate()?;
        if config.dev_mode {
            warn!("bridge running in single-tenant dev mode");
        }
        Ok(Self {
            config,
            transport,
            sessions: SessionInjector::new(resolver, store),
            catalogs: RwLock::new(HashMap::new()),
        })
    }

    pub fn with_http(
        config: BridgeConfig,
        resolver: Arc<dyn CredentialResolver>,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, BridgeError> {
        let transport = Arc::new(HttpTransport::from_config(&config)?);
        Self::new(config, transport, resolver, store)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub async fn create_session(
        &self,
        tenant_id: &str,
        session_id: Option<String>,
    ) -> Result<SessionCreated, BridgeError> {
        self.sessions.create_session(tenant_id, session_id).await
    }

    pub async fn get_session(&self, tenant_id: &str, session_id: &str) -> Result<SessionView, BridgeError> {
        self.sessions
            .store()
            .get_session(tenant_id, session_id)
            .await?
            .map(|s| s.view())
            .ok_or_else(|| not_found(tenant_id, session_id))
    }

    /// Deletes the session and drops any catalog no remaining session uses.
    pub async fn delete_session(&self, tenant_id: &str, session_id: &str) -> Result<bool, BridgeError> {
        let removed = self.sessions.store().delete_session(tenant_id, session_id).await?;

        let key = (tenant_id.to_string(), session_id.to_string());
        let mut catalogs = self.catalogs.write().await;
        let before = catalogs.len();
        catalogs.retain(|_, entry| {
            entry.holders.remove(&key);
            !entry.holders.is_empty()
        });
        if catalogs.len() < before {
            debug!(tenant_id, "released CRM tool catalog");
        }
        Ok(removed)
    }

    /// Number of credential sets with a live catalog.
    pub async fn cached_catalogs(&self) -> usize {
        self.catalogs.read().await.len()
    }

    /// Function declarations for the session's tenant; empty when the
    /// session has no credentials.
    pub async fn declarations(
        &self,
        tenant_id: &str,
        session_id: &str,
    ) -> Result<Vec<FunctionDeclaration>, BridgeError> {
        let Some(credentials) = self.session_credentials(tenant_id, session_id).await? else {
            return Ok(Vec::new());
        };
        let catalog = self.catalog_for(tenant_id, session_id, &credentials).await?;
        let tools = catalog.get_tools().await?;
        Ok(tools.iter().map(|t| t.declaration()).collect())
    }

    /// Dispatches one tool call with the session's credentials.
    ///
    /// Every expected failure, including a tool name the catalog does not
    /// hold, comes back inside the `ToolResult`; only a missing session is
    /// an error.
    pub async fn invoke(
        &self,
        tenant_id: &str,
        session_id: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolResult, BridgeError> {
        let Some(credentials) = self.session_credentials(tenant_id, session_id).await? else {
            debug!(tenant_id, tool = tool_name, "session has no credentials");
            return Ok(ToolResult::not_connected(tool_name));
        };

        let catalog = self.catalog_for(tenant_id, session_id, &credentials).await?;
        let tool = match catalog.find(tool_name).await {
            Ok(Some(tool)) => tool,
            Ok(None) => {
                warn!(tenant_id, tool = tool_name, "unknown CRM tool requested");
                let failure = ToolFailure::new(FailureCategory::UnknownTool, Some(format!("no tool named '{tool_name}'")));
                return Ok(ToolResult::failure(tool_name, failure, None));
            }
            Err(err) => return Ok(ToolResult::failure(tool_name, ToolFailure::from(&err), None)),
        };

        debug!(tenant_id, tool = tool.remote_name(), scope_id = tool.scope_id(), "dispatching CRM tool");
        Ok(tool.invoke(arguments).await)
    }

    /// Drops the cached catalog for the session's credentials.
    pub async fn refresh_tools(&self, tenant_id: &str, session_id: &str) -> Result<(), BridgeError> {
        if let Some(credentials) = self.session_credentials(tenant_id, session_id).await? {
            if let Some(entry) = self.catalogs.read().await.get(&credentials) {
                entry.catalog.close().await;
            }
        }
        Ok(())
    }

    async fn session_credentials(
        &self,
        tenant_id: &str,
        session_id: &str,
    ) -> Result<Option<CredentialBundle>, BridgeError> {
        let session = self
            .sessions
            .store()
            .get_session(tenant_id, session_id)
            .await?
            .ok_or_else(|| not_found(tenant_id, session_id))?;
        Ok(session.state.credentials())
    }

    async fn catalog_for(
        &self,
        tenant_id: &str,
        session_id: &str,
        credentials: &CredentialBundle,
    ) -> Result<Arc<ToolCatalog>, BridgeError> {
        let mut catalogs = self.catalogs.write().await;
        let entry = match catalogs.entry(credentials.clone()) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => vacant.insert(CatalogEntry {
                catalog: Arc::new(self.build_catalog(credentials)?),
                holders: HashSet::new(),
            }),
        };
        entry.holders.insert((tenant_id.to_string(), session_id.to_string()));
        Ok(Arc::clone(&entry.catalog))
    }

    fn build_catalog(&self, credentials: &CredentialBundle) -> Result<ToolCatalog, BridgeError> {
        let catalog = ToolCatalog::new(Arc::clone(&self.transport), credentials.clone(), self.config.timeout())?
            .with_name_prefix(self.config.tool_name_prefix.clone());
        Ok(match &self.config.tool_filter {
            Some(names) => catalog.with_allow_list(names.iter().cloned()),
            None => catalog,
        })
    }
}

fn not_found(tenant_id: &str, session_id: &str) -> BridgeError {
    BridgeError::SessionNotFound {
        tenant_id: tenant_id.to_string(),
        session_id: session_id.to_string(),
    }
}
