use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "CaneScan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default HTTP bind address for the scan record service.
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";

/// Upper bound on a single upload request body (multipart overhead included).
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 12;

/// Model load attempts that take longer than this fall back to heuristics.
pub const DEFAULT_MODEL_LOAD_TIMEOUT_SECS: u64 = 30;

/// After a failed load, validations stay heuristic for this long.
pub const DEFAULT_LOAD_RETRY_BACKOFF_SECS: u64 = 60;

/// Get the application data directory
/// ~/CaneScan/ on all platforms
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_NAME)
}

/// Get the models directory (ONNX leaf classifier)
pub fn models_dir() -> PathBuf {
    app_data_dir().join("models")
}

/// Default location of the leaf classifier weights
pub fn leaf_model_path() -> PathBuf {
    models_dir().join("leaf-validator").join("model.onnx")
}

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "canescan=info,leafcheck=info,tower_http=info"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

/// Leaf validation engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model_path: PathBuf,
    pub load_timeout: Duration,
    pub load_retry_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model_path: leaf_model_path(),
            load_timeout: Duration::from_secs(DEFAULT_MODEL_LOAD_TIMEOUT_SECS),
            load_retry_backoff: Duration::from_secs(DEFAULT_LOAD_RETRY_BACKOFF_SECS),
        }
    }
}

impl EngineConfig {
    /// Read overrides from `CANESCAN_MODEL_PATH` and `CANESCAN_MODEL_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = env_var("CANESCAN_MODEL_PATH") {
            config.model_path = PathBuf::from(path);
        }
        if let Some(secs) = parse_env::<u64>("CANESCAN_MODEL_TIMEOUT_SECS")? {
            config.load_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

/// Scan record service settings.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            data_dir: app_data_dir(),
            max_upload_bytes: (DEFAULT_MAX_UPLOAD_MB * 1024 * 1024) as usize,
        }
    }
}

impl ServiceConfig {
    /// Build from environment, falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(addr) = parse_env::<SocketAddr>("CANESCAN_BIND")? {
            config.bind_addr = addr;
        }
        if let Some(dir) = env_var("CANESCAN_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(mb) = parse_env::<u64>("CANESCAN_MAX_UPLOAD_MB")? {
            config.max_upload_bytes = (mb * 1024 * 1024) as usize;
        }
        Ok(config)
    }

    /// SQLite file holding the `scan_results` table.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("scans.db")
    }

    /// Root directory of the filesystem blob store.
    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }
}

fn env_var(var: &'static str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match env_var(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { var, value }),
    }
}
