use anyhow::Result;
use clap::{Parser, Subcommand};
use kitchensync::auth::{AuthService, TokenSigner};
use kitchensync::config::Config;
use kitchensync::gateway::{self, AppState};
use kitchensync::inventory::{InventoryLedger, LogQuery};
use kitchensync::kitchen::KitchenDirectory;
use kitchensync::store::Store;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kitchensync", version, about = "Shared kitchen inventory tracker")]
struct Cli {
    /// Path to a config.toml (defaults to the platform data directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.host.clone());
            let port = port.unwrap_or(config.port);

            let db_path = config.database_path()?;
            let store = Arc::new(Store::open(&db_path)?);
            tracing::info!("Database ready at {}", db_path.display());

            let signer = TokenSigner::new(
                config.jwt_secret()?,
                config.access_ttl_secs,
                config.refresh_ttl_secs,
            );

            let state = AppState {
                store: store.clone(),
                directory: Arc::new(KitchenDirectory::new(store.clone())),
                auth: Arc::new(AuthService::new(store.clone(), signer)),
                ledger: Arc::new(InventoryLedger::new(store.clone())),
                logs: Arc::new(LogQuery::new(store)),
            };

            gateway::run(&host, port, state).await
        }
    }
}
