//! Configuration schema for stepcache
//!
//! Configuration is read from `.stepcache.toml` in the project (searched
//! upwards from the working directory) layered over
//! `~/.config/stepcache/config.toml`.

use crate::reconcile::DEFAULT_CONCURRENCY;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Step runner helper invocation
    pub helper: HelperConfig,

    /// Cache store settings
    pub cache: CacheConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Command prefix for the helper that lists and executes steps
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HelperConfig {
    /// Program to run
    pub program: String,

    /// Arguments placed before `<runner> <command>`
    pub args: Vec<String>,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec![".github/actions/helper.py".to_string()],
        }
    }
}

/// Cache store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Store directory (default: platform cache dir)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_dir: Option<PathBuf>,

    /// Concurrent restore/save calls
    pub concurrency: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            store_dir: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl CacheConfig {
    /// Store directory with the platform default applied
    pub fn effective_store_dir(&self) -> PathBuf {
        self.store_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("stepcache")
                .join("store")
        })
    }

    /// Concurrency clamped to at least one
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[helper]"));
        assert!(toml.contains("[cache]"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.helper.program, "python3");
        assert_eq!(config.cache.concurrency, DEFAULT_CONCURRENCY);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [helper]
            program = "./ci/steps"
            args = []

            [cache]
            concurrency = 0
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.helper.program, "./ci/steps");
        assert!(config.helper.args.is_empty());
        assert_eq!(config.cache.effective_concurrency(), 1);
        assert_eq!(config.general.log_format, "text"); // default preserved
    }

    #[test]
    fn explicit_store_dir_wins() {
        let cache = CacheConfig {
            store_dir: Some(PathBuf::from("/var/cache/steps")),
            ..Default::default()
        };
        assert_eq!(cache.effective_store_dir(), PathBuf::from("/var/cache/steps"));
        assert!(CacheConfig::default()
            .effective_store_dir()
            .ends_with("stepcache/store"));
    }
}
