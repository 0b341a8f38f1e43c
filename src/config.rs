//! Staging runtime configuration from environment variables

use std::env;
use std::fmt;

/// Which `PersistentStore` implementation backs the runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Sqlite,
    Memory,
}

impl BackendType {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "sqlite" => Ok(BackendType::Sqlite),
            "memory" => Ok(BackendType::Memory),
            other => Err(ConfigError::InvalidValue(format!(
                "TRAINFLOW_STORE_BACKEND must be 'sqlite' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendType::Sqlite => write!(f, "sqlite"),
            BackendType::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Configuration for the staging runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct StagingConfig {
    /// Path to SQLite database file
    pub db_path: String,

    /// Directory holding the `*.sql` schema files
    pub schema_dir: String,

    /// Store backend
    pub backend: BackendType,

    /// Flush interval in milliseconds
    pub flush_interval_ms: u64,

    /// Channel buffer size for batch ingestion
    pub channel_buffer: usize,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            db_path: "trainflow.db".to_string(),
            schema_dir: "sql".to_string(),
            backend: BackendType::Sqlite,
            flush_interval_ms: 60_000,
            channel_buffer: 10_000,
        }
    }
}

impl StagingConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `TRAINFLOW_DB_PATH` (default: trainflow.db)
    /// - `TRAINFLOW_SCHEMA_DIR` (default: sql)
    /// - `TRAINFLOW_STORE_BACKEND` (default: sqlite; or memory)
    /// - `TRAINFLOW_FLUSH_INTERVAL_MS` (default: 60000)
    /// - `TRAINFLOW_CHANNEL_BUFFER` (default: 10000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let backend = match lookup("TRAINFLOW_STORE_BACKEND") {
            Some(value) => BackendType::parse(&value)?,
            None => defaults.backend,
        };

        Ok(Self {
            db_path: lookup("TRAINFLOW_DB_PATH").unwrap_or(defaults.db_path),

            schema_dir: lookup("TRAINFLOW_SCHEMA_DIR").unwrap_or(defaults.schema_dir),

            backend,

            flush_interval_ms: lookup("TRAINFLOW_FLUSH_INTERVAL_MS")
                .and_then(|s| s.parse().ok())
                .filter(|ms| *ms > 0)
                .unwrap_or(defaults.flush_interval_ms),

            channel_buffer: lookup("TRAINFLOW_CHANNEL_BUFFER")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.channel_buffer),
        })
    }
}
