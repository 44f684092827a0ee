//! Configuration management for stepcache

pub mod schema;

pub use schema::Config;

use crate::error::{StepCacheError, StepCacheResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File name of the project-local config
pub const LOCAL_CONFIG_FILE: &str = ".stepcache.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stepcache")
            .join("config.toml")
    }

    /// Search `start` and its ancestors for a project-local config
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(LOCAL_CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> StepCacheResult<Config> {
        self.load_merged(None).await
    }

    /// Load the config file with a project-local file layered on top
    ///
    /// Tables merge key by key; any other local value replaces the base.
    pub async fn load_merged(&self, local: Option<&Path>) -> StepCacheResult<Config> {
        let mut merged = toml::Table::new();

        if self.config_path.exists() {
            merged = read_table(&self.config_path).await?;
        } else {
            debug!("Config file {} not found, using defaults", self.config_path.display());
        }

        if let Some(local) = local {
            debug!("Layering local config {}", local.display());
            merge_tables(&mut merged, read_table(local).await?);
        }

        let path = local.unwrap_or(self.config_path.as_path());
        let config: Config = toml::Value::Table(merged)
            .try_into::<Config>()
            .map_err(|e| StepCacheError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        validate(&config, path)?;
        Ok(config)
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_table(path: &Path) -> StepCacheResult<toml::Table> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| StepCacheError::io(format!("reading config from {}", path.display()), e))?;

    content
        .parse::<toml::Table>()
        .map_err(|e| StepCacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        let overlay_table = match value {
            toml::Value::Table(table) => table,
            other => {
                base.insert(key, other);
                continue;
            }
        };
        if let Some(toml::Value::Table(base_table)) = base.get_mut(&key) {
            merge_tables(base_table, overlay_table);
            continue;
        }
        base.insert(key, toml::Value::Table(overlay_table));
    }
}

fn validate(config: &Config, path: &Path) -> StepCacheResult<()> {
    if !matches!(config.general.log_format.as_str(), "text" | "json") {
        return Err(StepCacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: format!(
                "general.log_format must be \"text\" or \"json\", got {:?}",
                config.general.log_format
            ),
        });
    }
    if config.helper.program.trim().is_empty() {
        return Err(StepCacheError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: "helper.program must not be empty".to_string(),
        });
    }
    Ok(())
}
