pub mod api; // HTTP surface for scan records
pub mod blob;
pub mod client; // HTTP client for the scan API
pub mod config;
pub mod db;
pub mod detection; // Simulated disease detection
pub mod leaf; // Leaf validation engine
pub mod models;
pub mod scans; // Scan record service

use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::api::{ApiContext, ScanApiServer, ServerError};
use crate::blob::{BlobError, FsBlobStore};
use crate::config::{ConfigError, ServiceConfig};
use crate::db::DatabaseError;
use crate::scans::ScanService;

/// Startup failures of the scan service.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Blob store error: {0}")]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}

/// Open the database and blob store under `config.data_dir`.
pub fn build_scan_service(config: &ServiceConfig) -> Result<ScanService, AppError> {
    let conn = db::open_database(&config.database_path())?;
    let blobs = FsBlobStore::new(config.blob_dir())?;
    Ok(ScanService::new(Arc::new(blobs), conn))
}

/// Start the scan API with file-backed storage.
pub async fn run_server(config: &ServiceConfig) -> Result<ScanApiServer, AppError> {
    tracing::info!(
        "{} scan service starting v{}",
        config::APP_NAME,
        config::APP_VERSION
    );
    tracing::info!(data_dir = %config.data_dir.display(), "Using data directory");

    let scans = build_scan_service(config)?;
    let ctx = ApiContext::new(Arc::new(scans), config.max_upload_bytes);
    Ok(api::start_server_on(ctx, config.bind_addr).await?)
}
