//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    /// Root of per-identity submission/reply storage.
    pub store_dir: PathBuf,
    /// Where reply key material lives.
    pub key_dir: PathBuf,
    pub log_level: Level,
    /// Policy flag gating document uploads; not owned by the core.
    pub allow_document_uploads: bool,
    /// Capacity of the checksum work queue.
    pub checksum_queue_depth: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let store_dir = std::env::var("STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./store"));

        let key_dir = std::env::var("KEY_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./keys"));

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let allow_document_uploads = match std::env::var("ALLOW_DOCUMENT_UPLOADS") {
            Ok(raw) => raw.parse::<bool>().map_err(|_| {
                ConfigError::InvalidValue(
                    "ALLOW_DOCUMENT_UPLOADS".to_string(),
                    format!("'{}' is not a boolean", raw),
                )
            })?,
            Err(_) => true,
        };

        let checksum_queue_depth = match std::env::var("CHECKSUM_QUEUE_DEPTH") {
            Ok(raw) => raw.parse::<usize>().map_err(|_| {
                ConfigError::InvalidValue(
                    "CHECKSUM_QUEUE_DEPTH".to_string(),
                    format!("'{}' is not a queue depth", raw),
                )
            })?,
            Err(_) => 256,
        };

        Ok(Self {
            bind_address,
            database_url,
            store_dir,
            key_dir,
            log_level,
            allow_document_uploads,
            checksum_queue_depth,
        })
    }
}
