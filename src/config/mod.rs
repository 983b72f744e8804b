//! Configuration management for query-collapse
//!
//! Handles loading, saving, and validating configuration from TOML files,
//! with the database URL overridable from the environment.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Store connection settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Burst detection and fetch loop settings
    #[serde(default)]
    pub collapse: CollapseConfig,

    /// Duplicate write settings
    #[serde(default)]
    pub writer: WriterConfig,

    /// Dataset fan-out settings
    #[serde(default)]
    pub driver: DriverConfig,

    /// Path the config was loaded from (internal, not user-editable)
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

/// Store connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection string (e.g. sqlite://queries.db)
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum pooled connections shared by all workers
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Seconds to wait on a locked database before failing
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

/// Collapse loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollapseConfig {
    /// Queries fetched per iteration
    #[serde(default = "default_fetch_batch_size")]
    pub batch_size: usize,

    /// Largest gap in seconds between consecutive queries of one burst
    #[serde(default = "default_time_window_secs")]
    pub time_window_secs: f64,

    /// Search types left out of collapsing
    #[serde(default = "default_excluded_search_types")]
    pub excluded_search_types: Vec<String>,

    /// Deadline in seconds for the I/O of one iteration
    #[serde(default = "default_iteration_timeout_secs")]
    pub iteration_timeout_secs: u64,
}

/// Duplicate writer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Rows per insert batch
    #[serde(default = "default_write_batch_size")]
    pub batch_size: usize,

    /// Concurrent inserts within a batch
    #[serde(default = "default_write_concurrency")]
    pub concurrency: usize,
}

/// Dataset fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Datasets processed in parallel (0 = twice the logical CPU count)
    #[serde(default = "default_dataset_concurrency")]
    pub dataset_concurrency: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

impl Default for CollapseConfig {
    fn default() -> Self {
        Self {
            batch_size: default_fetch_batch_size(),
            time_window_secs: default_time_window_secs(),
            excluded_search_types: default_excluded_search_types(),
            iteration_timeout_secs: default_iteration_timeout_secs(),
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: default_write_batch_size(),
            concurrency: default_write_concurrency(),
        }
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            dataset_concurrency: default_dataset_concurrency(),
        }
    }
}

impl CollapseConfig {
    pub fn iteration_timeout(&self) -> Duration {
        Duration::from_secs(self.iteration_timeout_secs)
    }
}

impl DriverConfig {
    /// Effective dataset worker count; I/O-bound, so twice the CPU count by default
    pub fn resolved_concurrency(&self) -> usize {
        if self.dataset_concurrency > 0 {
            self.dataset_concurrency
        } else {
            num_cpus::get().max(1) * 2
        }
    }
}

impl Config {
    /// Get the default base directory (~/.query-collapse)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".query-collapse")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.config_file = Some(config_path.to_path_buf());
        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Load an explicitly given file, or the default file when it exists,
    /// or fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let default_path = Self::default_config_path();
        if default_path.exists() {
            return Self::load(&default_path);
        }

        debug!("No config file found, using defaults");
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved config to {:?}", path);
        Ok(())
    }

    /// The connection string is provided out-of-band and wins over the file
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            if !url.trim().is_empty() {
                self.database.url = url;
            }
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            return Err(Error::Config("database.url must not be empty".to_string()));
        }

        if self.database.max_connections == 0 {
            return Err(Error::Config(
                "database.max_connections must be positive".to_string(),
            ));
        }

        if self.collapse.batch_size == 0 {
            return Err(Error::Config(
                "collapse.batch_size must be positive".to_string(),
            ));
        }

        if !self.collapse.time_window_secs.is_finite() || self.collapse.time_window_secs < 0.0 {
            return Err(Error::Config(
                "collapse.time_window_secs must be a finite, non-negative number".to_string(),
            ));
        }

        if self.collapse.iteration_timeout_secs == 0 {
            return Err(Error::Config(
                "collapse.iteration_timeout_secs must be positive".to_string(),
            ));
        }

        if self.writer.batch_size == 0 || self.writer.concurrency == 0 {
            return Err(Error::Config(
                "writer.batch_size and writer.concurrency must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
