//! Session storage and credential injection.
//!
//! A session's state map is the only place a dispatcher learns which
//! credentials to use. Sessions are keyed by `(tenant_id, session_id)` so
//! two tenants can never read each other's state, even with colliding ids.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::credentials::{self, CredentialResolver};
use crate::error::BridgeError;
use crate::models::session::{Session, SessionState};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates a session; fails with `SessionExists` if the id is taken.
    async fn create_session(
        &self,
        tenant_id: &str,
        session_id: &str,
        state: SessionState,
    ) -> Result<Session, BridgeError>;

    async fn get_session(&self, tenant_id: &str, session_id: &str) -> Result<Option<Session>, BridgeError>;

    /// Returns whether a session was removed.
    async fn delete_session(&self, tenant_id: &str, session_id: &str) -> Result<bool, BridgeError>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<(String, String), Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(
        &self,
        tenant_id: &str,
        session_id: &str,
        state: SessionState,
    ) -> Result<Session, BridgeError> {
        let key = (tenant_id.to_string(), session_id.to_string());
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&key) {
            return Err(BridgeError::SessionExists {
                tenant_id: tenant_id.to_string(),
                session_id: session_id.to_string(),
            });
        }
        let session = Session::new(tenant_id, session_id, state);
        sessions.insert(key, session.clone());
        Ok(session)
    }

    async fn get_session(&self, tenant_id: &str, session_id: &str) -> Result<Option<Session>, BridgeError> {
        let key = (tenant_id.to_string(), session_id.to_string());
        Ok(self.sessions.read().await.get(&key).cloned())
    }

    async fn delete_session(&self, tenant_id: &str, session_id: &str) -> Result<bool, BridgeError> {
        let key = (tenant_id.to_string(), session_id.to_string());
        Ok(self.sessions.write().await.remove(&key).is_some())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionCreated {
    pub session_id: String,
    pub tenant_id: String,
    pub credentials_loaded: bool,
    pub message: String,
}

/// Resolves tenant credentials once, at session creation, and writes them
/// into the new session's state.
pub struct SessionInjector {
    resolver: Arc<dyn CredentialResolver>,
    store: Arc<dyn SessionStore>,
}

impl SessionInjector {
    pub fn new(resolver: Arc<dyn CredentialResolver>, store: Arc<dyn SessionStore>) -> Self {
        Self { resolver, store }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Creates the session even when resolution fails; it is then marked
    /// not-credentialed.
    pub async fn create_session(
        &self,
        tenant_id: &str,
        session_id: Option<String>,
    ) -> Result<SessionCreated, BridgeError> {
        if tenant_id.trim().is_empty() {
            return Err(BridgeError::Configuration("tenant id is required".to_string()));
        }
        let session_id = session_id
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let resolved = self.resolver.resolve(tenant_id).await;
        let (state, credentials_loaded) = match resolved {
            Some(creds) if credentials::validate(Some(&creds)) => (SessionState::credentialed(tenant_id, &creds), true),
            _ => (SessionState::uncredentialed(tenant_id), false),
        };

        self.store.create_session(tenant_id, &session_id, state).await?;
        info!(tenant_id, session_id = %session_id, credentials_loaded, "session created");

        let message = if credentials_loaded {
            "Session created with credentials loaded."
        } else {
            "Session created but credentials not found. User needs to connect their accounts."
        };
        Ok(SessionCreated {
            session_id,
            tenant_id: tenant_id.to_string(),
            credentials_loaded,
            message: message.to_string(),
        })
    }
}
