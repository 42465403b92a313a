use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use kvdb_store::{DbProducer, DropHook, SharedStore, StoreError, StoreResult};
use tracing::{debug, info, warn};

use crate::config::{DbSizing, FileStoreOptions, ProducerConfig, SyncMode};
use crate::store::FileStore;

/// Picks the cache and handle budget for a database by name.
pub type SizingFn = Arc<dyn Fn(&str) -> DbSizing + Send + Sync>;

/// [`DbProducer`] that keeps one [`FileStore`] per subdirectory of `datadir`.
///
/// Opening a name that is already open returns the same store. Destroying a
/// store removes its directory.
pub struct FileProducer {
    datadir: PathBuf,
    sizing: SizingFn,
    sync_mode: SyncMode,
    open: Mutex<HashMap<String, Weak<FileStore>>>,
}

impl FileProducer {
    pub fn new(datadir: impl Into<PathBuf>, sizing: SizingFn) -> Self {
        Self {
            datadir: datadir.into(),
            sizing,
            sync_mode: SyncMode::default(),
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Producer sized from a loaded [`ProducerConfig`].
    pub fn from_config(datadir: impl Into<PathBuf>, config: &ProducerConfig) -> Self {
        let config = config.clone();
        let sync_mode = config.sync_mode;
        let sizing: SizingFn = Arc::new(move |name: &str| config.sizing_for(name));
        Self::new(datadir, sizing).with_sync_mode(sync_mode)
    }

    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Root directory holding one subdirectory per database.
    pub fn datadir(&self) -> &Path {
        &self.datadir
    }
}

impl DbProducer for FileProducer {
    /// Subdirectory names, sorted. An unreadable root lists nothing.
    fn names(&self) -> Vec<String> {
        let entries = match fs::read_dir(&self.datadir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(datadir = %self.datadir.display(), error = %e, "cannot list datadir");
                return Vec::new();
            }
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        names
    }

    /// The table stays locked from lookup to insert, so concurrent callers
    /// asking for one name share a single store.
    fn open_db(&self, name: &str) -> StoreResult<SharedStore> {
        validate_name(name)?;
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        let live = open
            .get(name)
            .and_then(Weak::upgrade)
            .filter(|store| !store.is_closed());
        if let Some(store) = live {
            return Ok(store);
        }

        let dir = self.datadir.join(name);
        fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        let sizing = (self.sizing)(name);
        let options = FileStoreOptions::new(sizing, self.sync_mode);
        let store = FileStore::open(&dir, options, Some(remove_dir_hook(dir.clone())))
            .map_err(|source| StoreError::Open {
                path: dir.clone(),
                source: Box::new(source),
            })?;
        let store = Arc::new(store);
        open.insert(name.to_string(), Arc::downgrade(&store));
        info!(name, dir = %dir.display(), "opened database");
        Ok(store)
    }
}

impl std::fmt::Debug for FileProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileProducer")
            .field("datadir", &self.datadir)
            .field("sync_mode", &self.sync_mode)
            .finish_non_exhaustive()
    }
}

/// A name must map to exactly one direct child of the data directory.
fn validate_name(name: &str) -> StoreResult<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn remove_dir_hook(dir: PathBuf) -> DropHook {
    Box::new(move || match fs::remove_dir_all(&dir) {
        Ok(()) => info!(dir = %dir.display(), "removed database directory"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(dir = %dir.display(), error = %e, "failed to remove database directory"),
    })
}
