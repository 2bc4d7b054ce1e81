//! Storage configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::Source;

/// Where the stores live and how their connections are tuned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the store files.
    pub path: PathBuf,

    /// Engine directives applied once per opened connection, in order.
    ///
    /// These are passed through untouched as `PRAGMA key = value`.
    pub pragmas: Vec<(String, String)>,

    /// How long SQLite itself waits on a lock held by another process.
    pub busy_timeout_ms: u64,

    /// Bounded wait for the process-wide write lock.
    pub write_timeout_ms: u64,

    /// Pool size per opened store.
    pub max_connections: u32,
}

impl StorageConfig {
    /// Config rooted at a specific directory, other settings default.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Path of the store file for a source.
    pub fn database_path(&self, source: Source) -> PathBuf {
        self.path.join(source.file_name())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Add or replace a pragma.
    pub fn with_pragma(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.pragmas.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.pragmas.push((key, value)),
        }
        self
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("usage-stats")
                .join("resources"),
            pragmas: vec![
                ("cache_size".to_string(), "-4000".to_string()),
                ("synchronous".to_string(), "NORMAL".to_string()),
                ("temp_store".to_string(), "MEMORY".to_string()),
            ],
            busy_timeout_ms: 5000,
            write_timeout_ms: 3000,
            max_connections: 4,
        }
    }
}
