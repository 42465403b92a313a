use std::path::PathBuf;

use kvdb_store::keys::{join_key, prefix_upper_bound};
use kvdb_store::{
    Batch, BatchOp, BatchTarget, Iteratee, KeyValueReader, KeyValueWriter, OpBatch, SharedStore,
    Snapshot, Store, StoreError, StoreIterator, StoreResult,
};

/// Map a view-relative `end` bound to the underlying keyspace. An empty end
/// means "to the end of the view", i.e. the prefix's upper bound.
fn upper(prefix: &[u8], end: &[u8]) -> Vec<u8> {
    if end.is_empty() {
        prefix_upper_bound(prefix).unwrap_or_default()
    } else {
        join_key(prefix, end)
    }
}

/// A store view that transparently prefixes every key.
///
/// Iterators yield keys with the prefix stripped. The view does not own the
/// underlying store: `close` and `destroy` do nothing.
#[derive(Clone)]
pub struct Table {
    db: SharedStore,
    prefix: Vec<u8>,
}

impl Table {
    pub fn new(db: SharedStore, prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            db,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// The store this view reads and writes through.
    pub fn underlying(&self) -> &SharedStore {
        &self.db
    }
}

impl KeyValueReader for Table {
    fn has(&self, key: &[u8]) -> StoreResult<bool> {
        self.db.has(&join_key(&self.prefix, key))
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.db.get(&join_key(&self.prefix, key))
    }
}

impl KeyValueWriter for Table {
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.db.put(&join_key(&self.prefix, key), value)
    }

    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.db.delete(&join_key(&self.prefix, key))
    }

    fn delete_range(&self, start: &[u8], end: &[u8]) -> StoreResult<()> {
        self.db
            .delete_range(&join_key(&self.prefix, start), &upper(&self.prefix, end))
    }
}

impl Iteratee for Table {
    fn new_iterator(&self, prefix: &[u8], start: &[u8]) -> Box<dyn StoreIterator> {
        let inner = self.db.new_iterator(&join_key(&self.prefix, prefix), start);
        Box::new(StrippedIterator::new(inner, self.prefix.len()))
    }
}

impl Store for Table {
    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(OpBatch::new(TableTarget {
            db: self.db.clone(),
            prefix: self.prefix.clone(),
        }))
    }

    fn get_snapshot(&self) -> StoreResult<Box<dyn Snapshot>> {
        Ok(Box::new(TableSnapshot {
            inner: self.db.get_snapshot()?,
            prefix: self.prefix.clone(),
        }))
    }

    fn stat(&self, property: &str) -> StoreResult<String> {
        self.db.stat(property)
    }

    fn compact(&self, start: &[u8], limit: &[u8]) -> StoreResult<()> {
        self.db
            .compact(&join_key(&self.prefix, start), &upper(&self.prefix, limit))
    }

    fn close(&self) -> StoreResult<()> {
        Ok(())
    }

    fn destroy(&self) {}

    fn ancient_datadir(&self) -> StoreResult<Option<PathBuf>> {
        self.db.ancient_datadir()
    }
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("prefix", &String::from_utf8_lossy(&self.prefix))
            .finish_non_exhaustive()
    }
}

/// Writes a view batch as one underlying batch with prefixed keys.
struct TableTarget {
    db: SharedStore,
    prefix: Vec<u8>,
}

impl BatchTarget for TableTarget {
    fn commit(&self, ops: &[BatchOp]) -> StoreResult<()> {
        let mut batch = self.db.new_batch();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => batch.put(&join_key(&self.prefix, key), value)?,
                BatchOp::Delete { key } => batch.delete(&join_key(&self.prefix, key))?,
                BatchOp::DeleteRange { start, end } => batch
                    .delete_range(&join_key(&self.prefix, start), &upper(&self.prefix, end))?,
            }
        }
        batch.write()
    }
}

/// Snapshot of the underlying store, read through the view's prefix.
struct TableSnapshot {
    inner: Box<dyn Snapshot>,
    prefix: Vec<u8>,
}

impl KeyValueReader for TableSnapshot {
    fn has(&self, key: &[u8]) -> StoreResult<bool> {
        self.inner.has(&join_key(&self.prefix, key))
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.inner.get(&join_key(&self.prefix, key))
    }
}

impl Iteratee for TableSnapshot {
    fn new_iterator(&self, prefix: &[u8], start: &[u8]) -> Box<dyn StoreIterator> {
        let inner = self
            .inner
            .new_iterator(&join_key(&self.prefix, prefix), start);
        Box::new(StrippedIterator::new(inner, self.prefix.len()))
    }
}

impl Snapshot for TableSnapshot {
    fn release(&mut self) {
        self.inner.release();
    }
}

/// Iterator that hides the view prefix from returned keys.
struct StrippedIterator {
    inner: Box<dyn StoreIterator>,
    strip: usize,
}

impl StrippedIterator {
    fn new(inner: Box<dyn StoreIterator>, strip: usize) -> Self {
        Self { inner, strip }
    }
}

impl StoreIterator for StrippedIterator {
    fn next(&mut self) -> bool {
        self.inner.next()
    }

    fn error(&self) -> Option<&StoreError> {
        self.inner.error()
    }

    // The inner iterator is bounded by the prefix, so every key carries it.
    fn key(&self) -> Option<&[u8]> {
        self.inner.key().and_then(|k| k.get(self.strip..))
    }

    fn value(&self) -> Option<&[u8]> {
        self.inner.value()
    }

    fn release(&mut self) {
        self.inner.release();
    }
}
