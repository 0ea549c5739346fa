use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::credentials::CredentialResolver;
use crate::error::BridgeError;
use crate::models::credentials::CredentialBundle;

/// Durable tenant -> credential table.
pub struct SqliteCredentialStore {
    db_path: PathBuf,
}

impl SqliteCredentialStore {
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self, BridgeError> {
        let db_path = db_path.into();
        init_db(&db_path)?;
        Ok(Self { db_path })
    }

    /// Opens the store at `CRM_CREDENTIALS_DB` or under the user data dir.
    pub fn open_default(app_name: &str) -> Result<Self, BridgeError> {
        Self::open(default_sqlite_path(app_name)?)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub fn upsert(&self, tenant_id: &str, credentials: &CredentialBundle) -> Result<(), BridgeError> {
        credentials.ensure_complete()?;
        let now = Utc::now().to_rfc3339();
        let conn = self.connection()?;
        conn.execute(
            r#"
            INSERT INTO tenant_credentials(tenant_id, token, scope_id, created_at, updated_at)
            VALUES(?1, ?2, ?3, ?4, ?4)
            ON CONFLICT(tenant_id) DO UPDATE SET
                token=excluded.token,
                scope_id=excluded.scope_id,
                updated_at=excluded.updated_at;
            "#,
            params![tenant_id, credentials.token(), credentials.scope_id(), now],
        )?;
        Ok(())
    }

    pub fn get(&self, tenant_id: &str) -> Result<Option<CredentialBundle>, BridgeError> {
        let conn = self.connection()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT token, scope_id FROM tenant_credentials WHERE tenant_id=?1;",
                params![tenant_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(token, scope_id)| CredentialBundle::new(token, scope_id)))
    }

    pub fn remove(&self, tenant_id: &str) -> Result<bool, BridgeError> {
        let conn = self.connection()?;
        let n = conn.execute(
            "DELETE FROM tenant_credentials WHERE tenant_id=?1;",
            params![tenant_id],
        )?;
        Ok(n > 0)
    }

    pub fn tenant_ids(&self) -> Result<Vec<String>, BridgeError> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT tenant_id FROM tenant_credentials ORDER BY tenant_id;")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    fn connection(&self) -> Result<Connection, BridgeError> {
        Ok(Connection::open(&self.db_path)?)
    }
}

#[async_trait]
impl CredentialResolver for SqliteCredentialStore {
    async fn resolve(&self, tenant_id: &str) -> Option<CredentialBundle> {
        let db_path = self.db_path.clone();
        let tenant = tenant_id.to_string();
        let lookup = tokio::task::spawn_blocking(move || Self { db_path }.get(&tenant)).await;
        match lookup {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                warn!(tenant_id, error = %e, "credential lookup failed");
                None
            }
            Err(e) => {
                warn!(tenant_id, error = %e, "credential lookup task failed");
                None
            }
        }
    }
}

fn init_db(db_path: &Path) -> Result<(), BridgeError> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| BridgeError::Store(e.to_string()))?;
    }

    let conn = Connection::open(db_path)?;
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;

        CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);
        INSERT INTO schema_version(version)
        SELECT 1
        WHERE NOT EXISTS (SELECT 1 FROM schema_version);

        CREATE TABLE IF NOT EXISTS tenant_credentials (
            tenant_id TEXT PRIMARY KEY,
            token TEXT NOT NULL,
            scope_id TEXT NOT NULL,
            created_at TEXT,
            updated_at TEXT
        );
        "#,
    )?;
    Ok(())
}

const DB_PATH_ENV: &str = "CRM_CREDENTIALS_DB";

/// `CRM_CREDENTIALS_DB` when set, else `<data dir>/<app>/credentials.db`.
fn default_sqlite_path(app_name: &str) -> Result<PathBuf, BridgeError> {
    let cwd = || std::env::current_dir().map_err(|e| BridgeError::Store(e.to_string()));
    if let Some(path) = std::env::var_os(DB_PATH_ENV) {
        let path = PathBuf::from(path);
        return Ok(if path.is_absolute() { path } else { cwd()?.join(path) });
    }
    let data_dir = match (std::env::var_os("XDG_DATA_HOME"), std::env::var_os("HOME")) {
        (Some(xdg), _) => PathBuf::from(xdg),
        (None, Some(home)) => PathBuf::from(home).join(".local").join("share"),
        (None, None) => cwd()?,
    };
    Ok(data_dir.join(app_name).join("credentials.db"))
}
