//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::SqliteQueryStore;
use std::path::Path;
use tracing::info;

/// Write a default config file and create the database schema.
///
/// The database file is placed next to the config file unless the
/// environment supplies a connection string.
pub async fn cmd_init(config_path: &Path, force: bool) -> Result<Config> {
    if config_path.exists() && !force {
        return Err(Error::AlreadyInitialized(config_path.display().to_string()));
    }

    let mut config = Config::default();
    if let Some(dir) = config_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        config.database.url = format!("sqlite://{}", dir.join("query-collapse.db").display());
    }
    config.save(config_path)?;

    let config = Config::load(config_path)?;
    let store = SqliteQueryStore::connect(&config.database).await?;
    store.close().await;

    info!(database = %config.database.url, "Initialized query-collapse");
    Ok(config)
}
