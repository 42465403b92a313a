use std::collections::BTreeMap;
use std::path::Path;

use kvdb_store::{StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Smallest cache budget, in MiB, a store is opened with.
pub const MIN_CACHE_MIB: usize = 16;

/// Smallest file-handle budget a store is opened with.
pub const MIN_HANDLES: u32 = 16;

/// Flush/sync strategy for the data log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncMode {
    /// `fsync` after every committed record (safest, highest latency).
    EveryWrite,
    /// Flush to the OS page cache only.
    #[default]
    OsDefault,
}

/// Cache and file-handle budget of one database.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbSizing {
    /// Cache budget in MiB.
    pub cache_mib: usize,
    /// Maximum number of open file handles.
    pub handles: u32,
}

impl Default for DbSizing {
    fn default() -> Self {
        Self {
            cache_mib: MIN_CACHE_MIB,
            handles: MIN_HANDLES,
        }
    }
}

/// Options for opening a [`FileStore`](crate::FileStore).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStoreOptions {
    pub sizing: DbSizing,
    pub sync_mode: SyncMode,
}

impl FileStoreOptions {
    pub fn new(sizing: DbSizing, sync_mode: SyncMode) -> Self {
        Self { sizing, sync_mode }
    }

    /// Raise budgets below the minimums.
    pub fn normalized(mut self) -> Self {
        self.sizing.cache_mib = self.sizing.cache_mib.max(MIN_CACHE_MIB);
        self.sizing.handles = self.sizing.handles.max(MIN_HANDLES);
        self
    }
}

/// Configuration of a [`FileProducer`](crate::FileProducer).
///
/// ```toml
/// sync_mode = "every-write"
///
/// [default]
/// cache_mib = 64
/// handles = 128
///
/// [overrides.chaindata]
/// cache_mib = 512
/// handles = 512
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    /// Sizing used for databases without an override.
    pub default: DbSizing,
    /// Per-name sizing.
    pub overrides: BTreeMap<String, DbSizing>,
    pub sync_mode: SyncMode,
}

impl ProducerConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> StoreResult<Self> {
        toml::from_str(text).map_err(|e| StoreError::InvalidConfig(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!(path = %path.display(), overrides = config.overrides.len(), "loaded producer config");
        Ok(config)
    }

    /// Sizing for the database called `name`.
    pub fn sizing_for(&self, name: &str) -> DbSizing {
        self.overrides.get(name).copied().unwrap_or(self.default)
    }
}
