use std::path::PathBuf;

use serde::Deserialize;

/// Message store configuration, deserializable from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the RocksDB database.
    pub data_dir: PathBuf,
    pub create_if_missing: bool,
    /// Sync the WAL on every commit so a commit is durable once it returns.
    pub sync_writes: bool,
    /// RocksDB `max_open_files`; -1 keeps every file open.
    pub max_open_files: i32,
}

impl StoreConfig {
    pub fn from_toml(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            create_if_missing: true,
            sync_writes: true,
            max_open_files: -1,
        }
    }
}
