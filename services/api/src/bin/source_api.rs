//! services/api/src/bin/source_api.rs

use api_lib::{
    adapters::{spawn_checksum_worker, FsStorage, KeyVault, SqliteStore},
    config::Config,
    error::ApiError,
    web::{router, AppState, SessionStore},
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let options =
        SqliteConnectOptions::from_str(&config.database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    let store = Arc::new(SqliteStore::new(pool));
    info!("Running database migrations...");
    store.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Adapters ---
    tokio::fs::create_dir_all(&config.store_dir).await?;
    tokio::fs::create_dir_all(&config.key_dir).await?;

    let vault = Arc::new(KeyVault::new(config.key_dir.clone()));
    let storage = Arc::new(FsStorage::new(config.store_dir.clone(), vault.clone()));
    let checksums = Arc::new(spawn_checksum_worker(
        store.clone(),
        config.store_dir.clone(),
        config.checksum_queue_depth,
    ));

    // --- 4. Build the Shared AppState ---
    let app_state = Arc::new(AppState {
        store: store.clone(),
        vault,
        storage,
        checksums,
        config: config.clone(),
        sessions: SessionStore::new(),
    });

    // --- 5. Create the Web Router & Serve ---
    let app = router(app_state);
    info!("Listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
