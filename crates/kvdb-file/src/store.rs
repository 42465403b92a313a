use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use kvdb_store::batch::apply_ops;
use kvdb_store::{
    Batch, BatchOp, BatchTarget, DropHook, FrozenSnapshot, Iteratee, KeyMap, KeyValueReader,
    KeyValueWriter, MapIterator, OpBatch, Snapshot, Store, StoreError, StoreIterator, StoreResult,
};
use tracing::{debug, info, warn};

use crate::config::FileStoreOptions;
use crate::lock::DirLock;
use crate::log::DataLog;

/// File name of the data log inside a database directory.
pub const LOG_FILE: &str = "data.log";

/// Live state of an open store: the index, the log that backs it, and the
/// directory lock held until close.
struct Open {
    map: Arc<KeyMap>,
    log: DataLog,
    lock: DirLock,
}

struct Inner {
    dir: PathBuf,
    options: FileStoreOptions,
    /// `None` once closed.
    state: RwLock<Option<Open>>,
}

impl Inner {
    fn view(&self) -> StoreResult<Arc<KeyMap>> {
        let state = self.state.read().map_err(StoreError::poisoned)?;
        state
            .as_ref()
            .map(|open| Arc::clone(&open.map))
            .ok_or(StoreError::Closed)
    }

    /// Log `ops` as one frame, then apply them to the index.
    fn commit(&self, ops: &[BatchOp]) -> StoreResult<()> {
        let mut state = self.state.write().map_err(StoreError::poisoned)?;
        let open = state.as_mut().ok_or(StoreError::Closed)?;
        open.log.append(ops)?;
        apply_ops(Arc::make_mut(&mut open.map), ops);
        Ok(())
    }

    /// Take the live state out after flushing its log. `None` if already
    /// closed. The directory lock is released when the result is dropped.
    fn shut(&self) -> StoreResult<Option<Open>> {
        let mut state = self.state.write().map_err(StoreError::poisoned)?;
        let Some(mut open) = state.take() else {
            return Ok(None);
        };
        open.log.flush()?;
        debug!(dir = %self.dir.display(), "file store closed");
        Ok(Some(open))
    }

    fn close(&self) -> StoreResult<()> {
        self.shut()?;
        Ok(())
    }
}

struct FileTarget(Arc<Inner>);

impl BatchTarget for FileTarget {
    fn commit(&self, ops: &[BatchOp]) -> StoreResult<()> {
        self.0.commit(ops)
    }
}

/// Durable, log-structured key-value store living in one directory.
///
/// Every write is appended to `data.log` before it becomes visible; the full
/// index is rebuilt from the log on open. A batch is one log frame, so a
/// crash mid-write loses the whole batch or none of it.
pub struct FileStore {
    inner: Arc<Inner>,
    on_drop: Mutex<Option<DropHook>>,
}

impl FileStore {
    /// Open (or create) the store in `dir`.
    ///
    /// `dir` must exist. The directory stays locked until the store is closed,
    /// so a second open of the same directory fails with
    /// [`StoreError::Locked`]. `on_drop` runs once, after the data has been
    /// removed by [`destroy`](Store::destroy).
    pub fn open(
        dir: &Path,
        options: FileStoreOptions,
        on_drop: Option<DropHook>,
    ) -> StoreResult<Self> {
        let options = options.normalized();
        let lock = DirLock::acquire(dir)?;
        info!(
            dir = %dir.display(),
            cache_mib = options.sizing.cache_mib,
            handles = options.sizing.handles,
            "allocated cache and file handles"
        );

        let path = dir.join(LOG_FILE);
        let replay = DataLog::replay(&path)?;
        let log = DataLog::open(&path, replay.valid_len, options.sync_mode)?;
        info!(
            dir = %dir.display(),
            entries = replay.map.len(),
            records = replay.records,
            skipped = replay.skipped,
            "file store opened"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                dir: dir.to_path_buf(),
                options,
                state: RwLock::new(Some(Open {
                    map: Arc::new(replay.map),
                    log,
                    lock,
                })),
            }),
            on_drop: Mutex::new(on_drop),
        })
    }

    /// Directory holding the store's files.
    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Effective options after clamping.
    pub fn options(&self) -> &FileStoreOptions {
        &self.inner.options
    }

    /// Whether [`close`](Store::close) or [`destroy`](Store::destroy) has run.
    pub fn is_closed(&self) -> bool {
        matches!(self.inner.view(), Err(StoreError::Closed))
    }

    /// Number of live entries. Zero once closed.
    pub fn len(&self) -> usize {
        self.inner.view().map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn log_size(&self) -> StoreResult<u64> {
        let state = self.inner.state.read().map_err(StoreError::poisoned)?;
        state
            .as_ref()
            .map(|open| open.log.offset())
            .ok_or(StoreError::Closed)
    }
}

impl KeyValueReader for FileStore {
    fn has(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.inner.view()?.contains_key(key))
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.inner.view()?.get(key).cloned())
    }
}

impl KeyValueWriter for FileStore {
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.inner.commit(&[BatchOp::Put {
            key: key.to_vec(),
            value: value.to_vec(),
        }])
    }

    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        if !self.has(key)? {
            return Ok(());
        }
        self.inner.commit(&[BatchOp::Delete { key: key.to_vec() }])
    }

    fn delete_range(&self, start: &[u8], end: &[u8]) -> StoreResult<()> {
        self.inner.commit(&[BatchOp::DeleteRange {
            start: start.to_vec(),
            end: end.to_vec(),
        }])
    }
}

impl Iteratee for FileStore {
    fn new_iterator(&self, prefix: &[u8], start: &[u8]) -> Box<dyn StoreIterator> {
        match self.inner.view() {
            Ok(map) => Box::new(MapIterator::new(map, prefix, start)),
            Err(e) => Box::new(MapIterator::failed(e)),
        }
    }
}

impl Store for FileStore {
    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(OpBatch::new(FileTarget(Arc::clone(&self.inner))))
    }

    fn get_snapshot(&self) -> StoreResult<Box<dyn Snapshot>> {
        Ok(Box::new(FrozenSnapshot::new(self.inner.view()?)))
    }

    fn stat(&self, property: &str) -> StoreResult<String> {
        match property {
            "entries" => Ok(self.inner.view()?.len().to_string()),
            "log.size" => Ok(self.log_size()?.to_string()),
            "cache.mib" => Ok(self.inner.options.sizing.cache_mib.to_string()),
            "handles" => Ok(self.inner.options.sizing.handles.to_string()),
            other => Err(StoreError::UnknownProperty(other.to_string())),
        }
    }

    /// Rewrite the data log without dead records. The log is a single file,
    /// so the key range is ignored and the whole log is compacted.
    fn compact(&self, _start: &[u8], _limit: &[u8]) -> StoreResult<()> {
        let mut state = self.inner.state.write().map_err(StoreError::poisoned)?;
        let open = state.as_mut().ok_or(StoreError::Closed)?;
        let before = open.log.offset();
        open.log.rewrite(&open.map)?;
        info!(
            dir = %self.inner.dir.display(),
            before,
            after = open.log.offset(),
            "compacted data log"
        );
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        self.inner.close()
    }

    fn destroy(&self) {
        let lock = match self.inner.shut() {
            Ok(open) => open.map(|Open { lock, .. }| lock),
            Err(e) => {
                warn!(dir = %self.inner.dir.display(), error = %e, "close before destroy failed");
                None
            }
        };
        let path = self.inner.dir.join(LOG_FILE);
        match fs::remove_file(&path) {
            Ok(()) => info!(dir = %self.inner.dir.display(), "file store destroyed"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove data log"),
        }
        // Only the holder may remove the lock file.
        if let Some(lock) = lock {
            lock.remove();
        }

        let hook = self
            .on_drop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("dir", &self.inner.dir)
            .field("entry_count", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
