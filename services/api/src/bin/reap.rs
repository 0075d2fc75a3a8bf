//! services/api/src/bin/reap.rs
//!
//! Batch command: remove pending source accounts that never completed a
//! submission, together with their key material. Runs out-of-band
//! against the same identity store as the server.

use api_lib::{
    adapters::{KeyVault, SqliteStore},
    config::Config,
    error::ApiError,
};
use clap::Parser;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::process::ExitCode;
use std::str::FromStr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "reap",
    about = "Remove pending source accounts, keeping the N newest"
)]
struct Args {
    /// Keep the N most recently created pending accounts untouched.
    #[arg(long, value_name = "N", default_value_t = 0)]
    keep_most_recent: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    // Partial failure inside a run is expected operational noise; the
    // exit status is success unconditionally.
    if let Err(err) = run(args).await {
        eprintln!("ERROR: reap run failed: {err}");
    }
    ExitCode::SUCCESS
}

async fn run(args: Args) -> Result<(), ApiError> {
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let options = SqliteConnectOptions::from_str(&config.database_url)?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    let store = SqliteStore::new(pool);
    let vault = KeyVault::new(config.key_dir.clone());

    let report = tipline_core::reaper::reap(args.keep_most_recent, &store, &vault).await;
    println!("Found {} pending sources", report.found);
    println!("Deleted {} pending sources", report.deleted);
    Ok(())
}
