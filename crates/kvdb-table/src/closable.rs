use std::path::PathBuf;
use std::sync::Arc;

use kvdb_store::{
    Batch, Iteratee, KeyValueReader, KeyValueWriter, SharedStore, Snapshot, Store, StoreIterator,
    StoreResult,
};
use tracing::debug;

use crate::table::Table;

/// A view whose `close` and `destroy` reach the store it was carved from.
///
/// Data calls go to `view`, which may be any store (a [`Table`], a decorator,
/// or the underlying store itself). `close` and `destroy` go to `underlying`.
/// Several views may share one physical store; only the owner should be
/// allowed to destroy it. Views built with `no_drop` swallow `destroy` but
/// still propagate `close`.
pub struct ClosableTable {
    view: SharedStore,
    underlying: SharedStore,
    no_drop: bool,
}

impl ClosableTable {
    pub fn new(view: SharedStore, underlying: SharedStore, no_drop: bool) -> Self {
        Self {
            view,
            underlying,
            no_drop,
        }
    }

    /// A [`Table`] over `prefix` of `underlying`.
    pub fn prefixed(underlying: SharedStore, prefix: impl Into<Vec<u8>>, no_drop: bool) -> Self {
        let view = Arc::new(Table::new(Arc::clone(&underlying), prefix));
        Self::new(view, underlying, no_drop)
    }

    /// Whether `destroy` is suppressed.
    pub fn no_drop(&self) -> bool {
        self.no_drop
    }

    pub fn view(&self) -> &SharedStore {
        &self.view
    }

    pub fn underlying(&self) -> &SharedStore {
        &self.underlying
    }
}

impl KeyValueReader for ClosableTable {
    fn has(&self, key: &[u8]) -> StoreResult<bool> {
        self.view.has(key)
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.view.get(key)
    }
}

impl KeyValueWriter for ClosableTable {
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.view.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.view.delete(key)
    }

    fn delete_range(&self, start: &[u8], end: &[u8]) -> StoreResult<()> {
        self.view.delete_range(start, end)
    }
}

impl Iteratee for ClosableTable {
    fn new_iterator(&self, prefix: &[u8], start: &[u8]) -> Box<dyn StoreIterator> {
        self.view.new_iterator(prefix, start)
    }
}

impl Store for ClosableTable {
    fn new_batch(&self) -> Box<dyn Batch> {
        self.view.new_batch()
    }

    fn get_snapshot(&self) -> StoreResult<Box<dyn Snapshot>> {
        self.view.get_snapshot()
    }

    fn stat(&self, property: &str) -> StoreResult<String> {
        self.view.stat(property)
    }

    fn compact(&self, start: &[u8], limit: &[u8]) -> StoreResult<()> {
        self.view.compact(start, limit)
    }

    fn close(&self) -> StoreResult<()> {
        self.underlying.close()
    }

    fn destroy(&self) {
        if self.no_drop {
            debug!("destroy suppressed");
            return;
        }
        self.underlying.destroy()
    }

    fn ancient_datadir(&self) -> StoreResult<Option<PathBuf>> {
        self.view.ancient_datadir()
    }
}

impl std::fmt::Debug for ClosableTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClosableTable")
            .field("no_drop", &self.no_drop)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use kvdb_devnull::DevNullStore;
    use kvdb_store::testing::run_store_contract;
    use kvdb_store::{MemoryStore, NamespaceRegistry, StoreError};

    use super::*;

    #[test]
    fn satisfies_store_contract() {
        let mem: SharedStore = Arc::new(MemoryStore::new());
        run_store_contract(&ClosableTable::prefixed(mem, "v/", false));
    }

    #[test]
    fn empty_prefix_forwards_verbatim() {
        let mem = Arc::new(MemoryStore::new());
        let shared = Arc::clone(&mem) as SharedStore;
        let view = ClosableTable::prefixed(shared, Vec::<u8>::new(), false);
        view.put(b"k", b"v").unwrap();
        assert_eq!(mem.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(view.stat("len").unwrap(), "1");
    }

    #[test]
    fn no_drop_keeps_data() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mem = Arc::new(MemoryStore::with_drop_hook(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        let view = ClosableTable::prefixed(Arc::clone(&mem) as SharedStore, "v/", true);
        view.put(b"k", b"v").unwrap();

        view.destroy();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!mem.is_closed());
        assert_eq!(view.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn close_propagates_even_with_no_drop() {
        let mem = Arc::new(MemoryStore::new());
        let view = ClosableTable::prefixed(Arc::clone(&mem) as SharedStore, "v/", true);
        view.close().unwrap();
        assert!(mem.is_closed());
    }

    #[test]
    fn destroy_propagates_to_owner_store() {
        let registry = NamespaceRegistry::new();
        let fs = registry.namespace("");
        let db = fs.open_fake_db("shared");
        let owner = ClosableTable::prefixed(Arc::clone(&db), "a/", false);
        let guest = ClosableTable::prefixed(Arc::clone(&db), "b/", true);
        owner.put(b"k", b"1").unwrap();
        guest.put(b"k", b"2").unwrap();

        guest.destroy();
        assert_eq!(fs.list_fake_dbs(), vec!["shared".to_string()]);

        owner.destroy();
        assert!(fs.list_fake_dbs().is_empty());
    }

    #[test]
    fn wraps_null_store() {
        let view = ClosableTable::prefixed(Arc::new(DevNullStore), "x/", false);
        view.put(b"k", b"v").unwrap();
        assert_eq!(view.get(b"k").unwrap(), None);
        view.close().unwrap();
        view.destroy();
    }

    #[test]
    fn unprefixed_view_reads_and_writes_directly() {
        let mem = Arc::new(MemoryStore::new());
        let shared = Arc::clone(&mem) as SharedStore;
        let view = ClosableTable::new(Arc::clone(&shared), shared, true);
        view.put(b"k", b"v").unwrap();
        assert_eq!(mem.get(b"k").unwrap(), Some(b"v".to_vec()));

        view.destroy();
        assert_eq!(mem.get(b"k").unwrap(), Some(b"v".to_vec()));
        view.close().unwrap();
        assert!(mem.is_closed());
    }

    #[test]
    fn data_and_lifecycle_go_to_different_stores() {
        let data = Arc::new(MemoryStore::new());
        let owner = Arc::new(MemoryStore::new());
        let view = ClosableTable::new(
            Arc::clone(&data) as SharedStore,
            Arc::clone(&owner) as SharedStore,
            false,
        );
        view.put(b"k", b"v").unwrap();
        assert_eq!(data.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(owner.get(b"k").unwrap(), None);

        view.close().unwrap();
        assert!(owner.is_closed());
        assert!(!data.is_closed());
        assert!(matches!(owner.get(b"k"), Err(StoreError::Closed)));
        assert_eq!(view.get(b"k").unwrap(), Some(b"v".to_vec()));
    }
}
