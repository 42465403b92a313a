use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use crate::batch::{apply_ops, delete_range, BatchOp, BatchTarget, OpBatch};
use crate::error::{StoreError, StoreResult};
use crate::iterator::{KeyMap, MapIterator};
use crate::snapshot::FrozenSnapshot;
use crate::traits::{
    Batch, DropHook, Iteratee, KeyValueReader, KeyValueWriter, Snapshot, Store, StoreIterator,
};

/// State shared between a [`MemoryStore`] and the batches it hands out.
///
/// `None` once the store is closed. The map is copy-on-write: snapshots and
/// iterators hold an `Arc` to the version that was current when they were
/// created.
struct Shared {
    data: RwLock<Option<Arc<KeyMap>>>,
}

impl Shared {
    fn view(&self) -> StoreResult<Arc<KeyMap>> {
        let data = self.data.read().map_err(StoreError::poisoned)?;
        data.as_ref().map(Arc::clone).ok_or(StoreError::Closed)
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut KeyMap) -> R) -> StoreResult<R> {
        let mut data = self.data.write().map_err(StoreError::poisoned)?;
        let map = data.as_mut().ok_or(StoreError::Closed)?;
        Ok(f(Arc::make_mut(map)))
    }
}

struct MemoryTarget(Arc<Shared>);

impl BatchTarget for MemoryTarget {
    fn commit(&self, ops: &[BatchOp]) -> StoreResult<()> {
        self.0.mutate(|map| apply_ops(map, ops))
    }
}

/// In-memory, `BTreeMap`-based key-value store.
///
/// Intended for tests and for simulating on-disk databases. Data lives behind
/// an `RwLock`; every data operation on a closed store fails with
/// [`StoreError::Closed`].
pub struct MemoryStore {
    shared: Arc<Shared>,
    on_drop: Mutex<Option<DropHook>>,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                data: RwLock::new(Some(Arc::new(KeyMap::new()))),
            }),
            on_drop: Mutex::new(None),
        }
    }

    /// Create a new empty store that runs `hook` when destroyed.
    pub fn with_drop_hook(hook: DropHook) -> Self {
        let store = Self::new();
        *store.on_drop.lock().unwrap_or_else(|e| e.into_inner()) = Some(hook);
        store
    }

    /// Number of entries currently stored. Zero once closed.
    pub fn len(&self) -> usize {
        self.shared.view().map_or(0, |m| m.len())
    }

    /// Returns `true` if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`close`](Store::close) has been called.
    pub fn is_closed(&self) -> bool {
        matches!(self.shared.view(), Err(StoreError::Closed))
    }

    fn total_bytes(&self) -> StoreResult<usize> {
        Ok(self
            .shared
            .view()?
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueReader for MemoryStore {
    fn has(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.shared.view()?.contains_key(key))
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.shared.view()?.get(key).cloned())
    }
}

impl KeyValueWriter for MemoryStore {
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.shared.mutate(|map| {
            map.insert(key.to_vec(), value.to_vec());
        })
    }

    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.shared.mutate(|map| {
            map.remove(key);
        })
    }

    fn delete_range(&self, start: &[u8], end: &[u8]) -> StoreResult<()> {
        self.shared.mutate(|map| delete_range(map, start, end))
    }
}

impl Iteratee for MemoryStore {
    fn new_iterator(&self, prefix: &[u8], start: &[u8]) -> Box<dyn StoreIterator> {
        match self.shared.view() {
            Ok(map) => Box::new(MapIterator::new(map, prefix, start)),
            Err(e) => Box::new(MapIterator::failed(e)),
        }
    }
}

impl Store for MemoryStore {
    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(OpBatch::new(MemoryTarget(Arc::clone(&self.shared))))
    }

    fn get_snapshot(&self) -> StoreResult<Box<dyn Snapshot>> {
        Ok(Box::new(FrozenSnapshot::new(self.shared.view()?)))
    }

    fn stat(&self, property: &str) -> StoreResult<String> {
        match property {
            "len" => Ok(self.shared.view()?.len().to_string()),
            "memory.size" => Ok(self.total_bytes()?.to_string()),
            other => Err(StoreError::UnknownProperty(other.to_string())),
        }
    }

    fn compact(&self, _start: &[u8], _limit: &[u8]) -> StoreResult<()> {
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        let mut data = self.shared.data.write().map_err(StoreError::poisoned)?;
        *data = None;
        Ok(())
    }

    fn destroy(&self) {
        {
            let mut data = self
                .shared
                .data
                .write()
                .unwrap_or_else(|e| e.into_inner());
            *data = None;
        }
        let hook = self.on_drop.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(hook) = hook {
            debug!("running memory store drop hook");
            hook();
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entry_count", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}
