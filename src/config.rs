//! Engine configuration.

use crate::service::{DEFAULT_MAX_RETRIES, DEFAULT_RECENT_LIMIT};
use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Settings for the table service and its store.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
pub struct EngineConfig {
    /// SQLite database file.
    #[serde(default = "default_database_path")]
    #[setters(into)]
    database_path: String,

    /// Attempts per command before giving up on version conflicts.
    #[serde(default = "default_max_retries")]
    #[getter(copy)]
    max_retries: usize,

    /// Page size of recent-table queries.
    #[serde(default = "default_recent_limit")]
    #[getter(copy)]
    recent_limit: usize,

    /// Seed for reproducible runs; entropy when absent.
    #[serde(default)]
    #[getter(copy)]
    #[setters(strip_option)]
    seed: Option<u64>,
}

#[instrument]
fn default_database_path() -> String {
    "boardroom.db".to_string()
}

#[instrument]
fn default_max_retries() -> usize {
    DEFAULT_MAX_RETRIES
}

#[instrument]
fn default_recent_limit() -> usize {
    DEFAULT_RECENT_LIMIT
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            max_retries: default_max_retries(),
            recent_limit: default_recent_limit(),
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or sets
    /// `max_retries` to zero.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;

        let config = Self::from_toml(&content)?;
        info!(database = %config.database_path, "Config loaded successfully");
        Ok(config)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on invalid TOML or a zero `max_retries`.
    #[instrument(skip(content))]
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        if config.max_retries == 0 {
            return Err(ConfigError::new("max_retries must be at least 1".to_string()));
        }
        Ok(config)
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: String) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}
