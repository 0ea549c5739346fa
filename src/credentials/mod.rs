//! Tenant id -> credential lookup.
//!
//! Lookups never fail loudly: a missing tenant, a broken store, or an
//! incomplete record all come back as `None` so the caller can create an
//! uncredentialed session instead.

pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::warn;

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::models::credentials::CredentialBundle;

pub use sqlite::SqliteCredentialStore;

pub const ENV_TOKEN: &str = "CRM_PIT_TOKEN";
pub const ENV_SCOPE_ID: &str = "CRM_LOCATION_ID";

#[async_trait]
pub trait CredentialResolver: Send + Sync {
    async fn resolve(&self, tenant_id: &str) -> Option<CredentialBundle>;
}

/// True iff every field of the bundle is non-empty.
pub fn validate(bundle: Option<&CredentialBundle>) -> bool {
    bundle.is_some_and(CredentialBundle::is_complete)
}

/// Fixed tenant map, for configuration-driven deployments and tests.
#[derive(Default)]
pub struct StaticCredentialResolver {
    tenants: HashMap<String, CredentialBundle>,
}

impl StaticCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>, credentials: CredentialBundle) -> Self {
        self.tenants.insert(tenant_id.into(), credentials);
        self
    }
}

#[async_trait]
impl CredentialResolver for StaticCredentialResolver {
    async fn resolve(&self, tenant_id: &str) -> Option<CredentialBundle> {
        self.tenants.get(tenant_id).cloned()
    }
}

/// SINGLE-TENANT DEV MODE: every tenant id resolves to the one credential
/// pair found in `CRM_PIT_TOKEN` / `CRM_LOCATION_ID`.
///
/// Only constructible from a config with `dev_mode = true`.
#[derive(Debug)]
pub struct EnvCredentialResolver {
    _private: (),
}

impl EnvCredentialResolver {
    pub fn for_dev_mode(cfg: &BridgeConfig) -> Result<Self, BridgeError> {
        if !cfg.dev_mode {
            return Err(BridgeError::Configuration(
                "environment credentials are only available in single-tenant dev mode".to_string(),
            ));
        }
        warn!("single-tenant dev mode: all tenants share credentials from the environment");
        Ok(Self { _private: () })
    }
}

#[async_trait]
impl CredentialResolver for EnvCredentialResolver {
    async fn resolve(&self, tenant_id: &str) -> Option<CredentialBundle> {
        let token = std::env::var(ENV_TOKEN).ok()?;
        let scope_id = std::env::var(ENV_SCOPE_ID).ok()?;
        warn!(tenant_id, "resolving tenant credentials from environment (dev mode)");
        Some(CredentialBundle::new(token, scope_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[tokio::test]
    async fn static_resolver_misses_unknown_tenants() {
        let resolver = StaticCredentialResolver::new().with_tenant("acme", CredentialBundle::new("t", "s"));
        assert_eq!(resolver.resolve("acme").await, Some(CredentialBundle::new("t", "s")));
        assert_eq!(resolver.resolve("globex").await, None);
    }

    #[test]
    fn validate_requires_all_fields() {
        assert!(validate(Some(&CredentialBundle::new("t", "s"))));
        assert!(!validate(Some(&CredentialBundle::new("t", ""))));
        assert!(!validate(None));
    }

    #[test]
    fn env_resolver_refused_outside_dev_mode() {
        let cfg = BridgeConfig::default();
        assert!(matches!(
            EnvCredentialResolver::for_dev_mode(&cfg),
            Err(BridgeError::Configuration(_))
        ));
    }

    #[tokio::test]
    #[serial]
    async fn env_resolver_reads_environment_in_dev_mode() {
        std::env::set_var(ENV_TOKEN, "dev-token");
        std::env::set_var(ENV_SCOPE_ID, "dev-loc");
        let cfg = BridgeConfig {
            dev_mode: true,
            ..BridgeConfig::default()
        };
        let resolver = EnvCredentialResolver::for_dev_mode(&cfg).unwrap();
        let resolved = resolver.resolve("anyone").await;
        std::env::remove_var(ENV_TOKEN);
        std::env::remove_var(ENV_SCOPE_ID);
        assert_eq!(resolved, Some(CredentialBundle::new("dev-token", "dev-loc")));
    }
}
