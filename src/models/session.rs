use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::credentials::CredentialBundle;

pub const KEY_TENANT_ID: &str = "user:id";
pub const KEY_CREDENTIALS_LOADED: &str = "user:credentials_loaded";
pub const KEY_CRM_TOKEN: &str = "user:crm_token";
pub const KEY_CRM_SCOPE_ID: &str = "user:crm_scope_id";

/// Key-value state owned by exactly one session.
///
/// `Debug` prints the redacted map.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState(BTreeMap<String, Value>);

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionState").field(&self.redacted()).finish()
    }
}

impl SessionState {
    /// State for a tenant whose credentials were resolved and validated.
    pub fn credentialed(tenant_id: &str, credentials: &CredentialBundle) -> Self {
        let mut state = Self::default();
        state.insert(KEY_TENANT_ID, Value::String(tenant_id.to_string()));
        state.insert(KEY_CREDENTIALS_LOADED, Value::Bool(true));
        state.insert(KEY_CRM_TOKEN, Value::String(credentials.token().to_string()));
        state.insert(KEY_CRM_SCOPE_ID, Value::String(credentials.scope_id().to_string()));
        state
    }

    /// State for a tenant with no usable credentials.
    pub fn uncredentialed(tenant_id: &str) -> Self {
        let mut state = Self::default();
        state.insert(KEY_TENANT_ID, Value::String(tenant_id.to_string()));
        state.insert(KEY_CREDENTIALS_LOADED, Value::Bool(false));
        state
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: &str, value: Value) -> Option<Value> {
        self.0.insert(key.to_string(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn credentials_loaded(&self) -> bool {
        self.get(KEY_CREDENTIALS_LOADED).and_then(Value::as_bool).unwrap_or(false)
    }

    /// The session's credentials, only when flagged loaded and complete.
    pub fn credentials(&self) -> Option<CredentialBundle> {
        if !self.credentials_loaded() {
            return None;
        }
        let token = self.get(KEY_CRM_TOKEN)?.as_str()?;
        let scope_id = self.get(KEY_CRM_SCOPE_ID)?.as_str()?;
        let bundle = CredentialBundle::new(token, scope_id);
        bundle.is_complete().then_some(bundle)
    }

    /// Copy of the state with secret-bearing keys dropped.
    pub fn redacted(&self) -> BTreeMap<String, Value> {
        self.0
            .iter()
            .filter(|(k, _)| !k.ends_with("_token") && !k.ends_with("_key"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub tenant_id: String,
    pub session_id: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl Session {
    pub fn new(tenant_id: &str, session_id: &str, state: SessionState) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: tenant_id.to_string(),
            session_id: session_id.to_string(),
            state,
            created_at: now,
            last_update: now,
        }
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session_id: self.session_id.clone(),
            tenant_id: self.tenant_id.clone(),
            credentials_loaded: self.state.credentials_loaded(),
            state: self.state.redacted(),
            created_at: self.created_at,
            last_update: self.last_update,
        }
    }
}

/// Client-safe projection of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: String,
    pub tenant_id: String,
    pub credentials_loaded: bool,
    pub state: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentialed_state_round_trips_bundle() {
        let creds = CredentialBundle::new("tok-a", "loc-a");
        let state = SessionState::credentialed("tenant-a", &creds);
        assert!(state.credentials_loaded());
        assert_eq!(state.credentials(), Some(creds));
    }

    #[test]
    fn loaded_flag_gates_credentials() {
        let creds = CredentialBundle::new("tok-a", "loc-a");
        let mut state = SessionState::credentialed("tenant-a", &creds);
        state.insert(KEY_CREDENTIALS_LOADED, Value::Bool(false));
        assert_eq!(state.credentials(), None);
    }

    #[test]
    fn partial_credentials_are_not_returned() {
        let mut state = SessionState::uncredentialed("tenant-a");
        state.insert(KEY_CREDENTIALS_LOADED, Value::Bool(true));
        state.insert(KEY_CRM_TOKEN, Value::String("tok".into()));
        state.insert(KEY_CRM_SCOPE_ID, Value::String(String::new()));
        assert_eq!(state.credentials(), None);
    }

    #[test]
    fn debug_output_hides_tokens() {
        let creds = CredentialBundle::new("tok-secret", "loc-a");
        let session = Session::new("tenant-a", "s1", SessionState::credentialed("tenant-a", &creds));
        let printed = format!("{session:?}");
        assert!(!printed.contains("tok-secret"));
        assert!(printed.contains("loc-a"));
        assert!(!format!("{:?}", session.state).contains("tok-secret"));
    }

    #[test]
    fn redacted_view_hides_tokens() {
        let creds = CredentialBundle::new("tok-secret", "loc-a");
        let mut state = SessionState::credentialed("tenant-a", &creds);
        state.insert("app:api_key", Value::String("k".into()));
        let view = Session::new("tenant-a", "s1", state).view();
        assert!(view.credentials_loaded);
        assert!(!view.state.contains_key(KEY_CRM_TOKEN));
        assert!(!view.state.contains_key("app:api_key"));
        assert_eq!(view.state[KEY_CRM_SCOPE_ID], "loc-a");
        assert!(!serde_json::to_string(&view).unwrap().contains("tok-secret"));
    }
}
