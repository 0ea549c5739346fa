//! Operator CLI for the CRM bridge.
//!
//! ```bash
//! # list the tools a tenant can use
//! crm-bridge tools --tenant acme
//!
//! # call one tool with explicit credentials
//! crm-bridge call contacts_get-contacts --args '{"query_query":"john"}' \
//!     --token pit-... --scope-id loc-...
//!
//! # dev mode only: credentials from CRM_PIT_TOKEN / CRM_LOCATION_ID
//! CRM_DEV_MODE=1 crm-bridge tools
//!
//! # store a tenant's credentials
//! crm-bridge tenant set acme --token pit-... --scope-id loc-...
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crm_bridge::credentials::{
    CredentialResolver, EnvCredentialResolver, SqliteCredentialStore, StaticCredentialResolver,
};
use crm_bridge::session::InMemorySessionStore;
use crm_bridge::{Bridge, BridgeConfig, CredentialBundle};

const APP_NAME: &str = "crm-bridge";
const CLI_TENANT: &str = "cli";

#[derive(Parser)]
#[command(name = "crm-bridge", about = "Multi-tenant CRM tool bridge")]
struct Cli {
    /// Credential database (defaults to CRM_CREDENTIALS_DB or the user data dir)
    #[arg(long, global = true)]
    credentials_db: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the function declarations exposed to the model
    Tools(CredentialArgs),
    /// Invoke one remote tool and print the result
    Call {
        /// Remote tool name or its function name
        tool: String,
        /// Arguments as a JSON object
        #[arg(long, default_value = "{}")]
        args: String,
        #[command(flatten)]
        creds: CredentialArgs,
    },
    /// Manage stored tenant credentials
    #[command(subcommand)]
    Tenant(TenantCommand),
}

#[derive(Subcommand)]
enum TenantCommand {
    Set {
        tenant_id: String,
        #[arg(long)]
        token: String,
        #[arg(long)]
        scope_id: String,
    },
    Remove {
        tenant_id: String,
    },
    List,
}

#[derive(Args)]
struct CredentialArgs {
    /// Resolve credentials for this tenant from the credential database
    #[arg(long, conflicts_with_all = ["token", "scope_id"])]
    tenant: Option<String>,
    #[arg(long, requires = "scope_id")]
    token: Option<String>,
    #[arg(long, requires = "token")]
    scope_id: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    match cli.command {
        Command::Tools(creds) => {
            let (bridge, tenant, session) = open_bridge(cli.credentials_db, creds).await?;
            let decls = bridge.declarations(&tenant, &session).await?;
            info!(count = decls.len(), "fetched tool declarations");
            println!("{}", serde_json::to_string_pretty(&decls)?);
        }
        Command::Call { tool, args, creds } => {
            let arguments: serde_json::Value =
                serde_json::from_str(&args).context("--args must be valid JSON")?;
            let (bridge, tenant, session) = open_bridge(cli.credentials_db, creds).await?;
            let result = bridge.invoke(&tenant, &session, &tool, arguments).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if !result.ok {
                std::process::exit(2);
            }
        }
        Command::Tenant(cmd) => {
            let store = open_store(cli.credentials_db)?;
            match cmd {
                TenantCommand::Set {
                    tenant_id,
                    token,
                    scope_id,
                } => {
                    store.upsert(&tenant_id, &CredentialBundle::new(token, scope_id))?;
                    info!(tenant_id, "stored credentials");
                }
                TenantCommand::Remove { tenant_id } => {
                    if !store.remove(&tenant_id)? {
                        bail!("no credentials stored for tenant '{tenant_id}'");
                    }
                }
                TenantCommand::List => {
                    for id in store.tenant_ids()? {
                        println!("{id}");
                    }
                }
            }
        }
    }
    Ok(())
}

fn open_store(path: Option<PathBuf>) -> Result<SqliteCredentialStore> {
    let store = match path {
        Some(p) => SqliteCredentialStore::open(p)?,
        None => SqliteCredentialStore::open_default(APP_NAME)?,
    };
    Ok(store)
}

async fn open_bridge(db: Option<PathBuf>, creds: CredentialArgs) -> Result<(Bridge, String, String)> {
    let config = BridgeConfig::from_env()?;

    let (resolver, tenant): (Arc<dyn CredentialResolver>, String) = match creds {
        CredentialArgs { tenant: Some(tenant), .. } => {
            let store: Arc<dyn CredentialResolver> = Arc::new(open_store(db)?);
            (store, tenant)
        }
        CredentialArgs {
            token: Some(token),
            scope_id: Some(scope_id),
            ..
        } => {
            let fixed = StaticCredentialResolver::new().with_tenant(CLI_TENANT, CredentialBundle::new(token, scope_id));
            let fixed: Arc<dyn CredentialResolver> = Arc::new(fixed);
            (fixed, CLI_TENANT.to_string())
        }
        _ if config.dev_mode => {
            let env: Arc<dyn CredentialResolver> = Arc::new(EnvCredentialResolver::for_dev_mode(&config)?);
            (env, CLI_TENANT.to_string())
        }
        _ => bail!("pass --tenant, or both --token and --scope-id"),
    };

    let bridge = Bridge::with_http(config, resolver, Arc::new(InMemorySessionStore::new()))?;
    let created = bridge.create_session(&tenant, None).await?;
    if !created.credentials_loaded {
        bail!("{}", created.message);
    }
    Ok((bridge, tenant, created.session_id))
}
