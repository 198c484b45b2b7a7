//! Telwatch - telecom activity monitoring backend
//! Serves the CSV data-import API and activity queries over whichever data
//! source is currently authoritative.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use telwatch_backend::{
    api::{create_router, AppState},
    import::{ImportEngine, SourceRegistry},
    models::Config,
    query::ActivityQueryService,
    store::SqliteLiveStore,
};

#[derive(Parser, Debug)]
#[command(name = "telwatch", about = "Telecom activity monitoring backend")]
struct Args {
    /// Address to bind the HTTP server to (overrides TELWATCH_BIND)
    #[arg(long)]
    bind: Option<String>,

    /// Directory for uploaded files and import metadata (overrides TELWATCH_DATA_DIR)
    #[arg(long)]
    data_dir: Option<String>,

    /// Path to the live-store SQLite database (overrides TELWATCH_DB_PATH)
    #[arg(long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut config = Config::from_env();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(database) = args.database {
        config.database_path = database;
    }

    let registry = Arc::new(SourceRegistry::load(
        Path::new(&config.data_dir).join("metadata.json"),
    ));
    let engine = Arc::new(
        ImportEngine::new(&config.data_dir, registry.clone())
            .context("Failed to initialize import engine")?,
    );
    let live = Arc::new(
        SqliteLiveStore::open(&config.database_path).context("Failed to open live store")?,
    );
    let query = Arc::new(ActivityQueryService::new(registry.clone(), live));

    let app = create_router(AppState {
        engine,
        registry,
        query,
    });

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "Telwatch backend listening");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
