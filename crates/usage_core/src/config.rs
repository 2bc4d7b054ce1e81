//! Configuration for the usage statistics library.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use usage_db::StorageConfig;

use crate::error::ConfigError;
use crate::{CoreError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Store location and connection tuning
    #[serde(default)]
    pub database: StorageConfig,

    /// Query compilation policy
    #[serde(default)]
    pub query: QueryConfig,

    /// Live result watching
    #[serde(default)]
    pub watcher: WatcherConfig,
}

/// What a zero or negative `Limit` means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroLimit {
    /// The query fails to compile
    #[default]
    Reject,
    /// The query returns every matching result
    Unbounded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Limit applied when no `Limit` term is given
    pub default_limit: i64,

    pub zero_limit: ZeroLimit,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            default_limit: 50,
            zero_limit: ZeroLimit::Reject,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Events buffered per subscriber before it starts lagging
    pub bus_capacity: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { bus_capacity: 256 }
    }
}

/// Load configuration from a file
pub async fn load_config(path: &Path) -> Result<StatsConfig> {
    let content =
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CoreError::ConfigurationError {
                config_path: path.display().to_string(),
                field: "file".to_string(),
                expected: "readable TOML file".to_string(),
                cause: ConfigError::Io(e.to_string()),
            })?;

    let config: StatsConfig =
        toml::from_str(&content).map_err(|e| CoreError::ConfigurationError {
            config_path: path.display().to_string(),
            field: "content".to_string(),
            expected: "valid TOML configuration".to_string(),
            cause: ConfigError::TomlParse(e.to_string()),
        })?;

    if config.query.default_limit <= 0 {
        return Err(CoreError::ConfigurationError {
            config_path: path.display().to_string(),
            field: "query.default_limit".to_string(),
            expected: "a positive number of results".to_string(),
            cause: ConfigError::Invalid(format!(
                "default_limit = {}",
                config.query.default_limit
            )),
        });
    }

    Ok(config)
}

/// Save configuration to a file
pub async fn save_config(config: &StatsConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CoreError::ConfigurationError {
                config_path: parent.display().to_string(),
                field: "directory".to_string(),
                expected: "writable directory".to_string(),
                cause: ConfigError::Io(e.to_string()),
            })?;
    }

    let content = toml::to_string_pretty(config).map_err(|e| CoreError::ConfigurationError {
        config_path: path.display().to_string(),
        field: "serialization".to_string(),
        expected: "serializable config structure".to_string(),
        cause: ConfigError::TomlSerialize(e.to_string()),
    })?;

    tokio::fs::write(path, content)
        .await
        .map_err(|e| CoreError::ConfigurationError {
            config_path: path.display().to_string(),
            field: "file".to_string(),
            expected: "writable file location".to_string(),
            cause: ConfigError::Io(e.to_string()),
        })?;

    Ok(())
}

/// Standard config file locations
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("usage-stats.toml")];

    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join("usage-stats").join("config.toml"));
    }

    paths
}

impl StatsConfig {
    /// Load configuration from the first standard location that exists,
    /// or defaults if none does.
    pub async fn load() -> Result<Self> {
        for path in config_paths() {
            if path.exists() {
                return load_config(&path).await;
            }
        }
        Ok(Self::default())
    }

    pub async fn load_from(path: &Path) -> Result<Self> {
        load_config(path).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        save_config(self, path).await
    }
}
