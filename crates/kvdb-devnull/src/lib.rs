//! An always-empty key-value store.
//!
//! [`DevNullStore`] accepts every operation and keeps nothing. Use it where a
//! store must be structurally present but persistence is switched off, so call
//! sites stay unchanged.

use kvdb_store::{
    Batch, EmptyIterator, Iteratee, KeyValueReader, KeyValueWriter, Snapshot, Store,
    StoreIterator, StoreResult,
};

/// Store that reports every key absent and discards every write.
#[derive(Clone, Copy, Debug, Default)]
pub struct DevNullStore;

impl DevNullStore {
    pub fn new() -> Self {
        Self
    }

    /// Always zero.
    pub fn len(&self) -> usize {
        0
    }

    /// Always `true`.
    pub fn is_empty(&self) -> bool {
        true
    }
}

impl KeyValueReader for DevNullStore {
    fn has(&self, _key: &[u8]) -> StoreResult<bool> {
        Ok(false)
    }

    fn get(&self, _key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(None)
    }
}

impl KeyValueWriter for DevNullStore {
    fn put(&self, _key: &[u8], _value: &[u8]) -> StoreResult<()> {
        Ok(())
    }

    fn delete(&self, _key: &[u8]) -> StoreResult<()> {
        Ok(())
    }

    fn delete_range(&self, _start: &[u8], _end: &[u8]) -> StoreResult<()> {
        Ok(())
    }
}

impl Iteratee for DevNullStore {
    fn new_iterator(&self, _prefix: &[u8], _start: &[u8]) -> Box<dyn StoreIterator> {
        Box::new(EmptyIterator)
    }
}

impl Store for DevNullStore {
    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(NullBatch)
    }

    fn get_snapshot(&self) -> StoreResult<Box<dyn Snapshot>> {
        Ok(Box::new(NullSnapshot {
            db: Some(DevNullStore::new()),
        }))
    }

    fn stat(&self, _property: &str) -> StoreResult<String> {
        Ok(String::new())
    }

    fn compact(&self, _start: &[u8], _limit: &[u8]) -> StoreResult<()> {
        Ok(())
    }

    fn close(&self) -> StoreResult<()> {
        Ok(())
    }

    fn destroy(&self) {}
}

/// Batch that queues nothing.
#[derive(Debug, Default)]
pub struct NullBatch;

impl Batch for NullBatch {
    fn put(&mut self, _key: &[u8], _value: &[u8]) -> StoreResult<()> {
        Ok(())
    }

    fn delete(&mut self, _key: &[u8]) -> StoreResult<()> {
        Ok(())
    }

    fn delete_range(&mut self, _start: &[u8], _end: &[u8]) -> StoreResult<()> {
        Ok(())
    }

    fn value_size(&self) -> usize {
        0
    }

    fn len(&self) -> usize {
        0
    }

    fn write(&mut self) -> StoreResult<()> {
        Ok(())
    }

    fn reset(&mut self) {}

    fn replay(&self, _writer: &dyn KeyValueWriter) -> StoreResult<()> {
        Ok(())
    }
}

/// Snapshot over another [`DevNullStore`]; dropped on release.
#[derive(Debug)]
pub struct NullSnapshot {
    db: Option<DevNullStore>,
}

impl KeyValueReader for NullSnapshot {
    fn has(&self, key: &[u8]) -> StoreResult<bool> {
        match &self.db {
            Some(db) => db.has(key),
            None => Ok(false),
        }
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        match &self.db {
            Some(db) => db.get(key),
            None => Ok(None),
        }
    }
}

impl Iteratee for NullSnapshot {
    fn new_iterator(&self, prefix: &[u8], start: &[u8]) -> Box<dyn StoreIterator> {
        match &self.db {
            Some(db) => db.new_iterator(prefix, start),
            None => Box::new(EmptyIterator),
        }
    }
}

impl Snapshot for NullSnapshot {
    fn release(&mut self) {
        self.db = None;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kvdb_store::{collect_entries, SharedStore};

    use super::*;

    #[test]
    fn writes_are_discarded() {
        let store = DevNullStore::new();
        let cases: [(&[u8], &[u8]); 3] = [(b"a", b"1"), (b"b", b""), (b"", b"x")];
        for (k, v) in cases {
            store.put(k, v).unwrap();
            assert!(!store.has(k).unwrap());
            assert_eq!(store.get(k).unwrap(), None);
        }
        store.delete(b"a").unwrap();
        store.delete_range(b"a", b"z").unwrap();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn iterator_is_empty() {
        let store = DevNullStore::new();
        store.put(b"k", b"v").unwrap();
        let mut it = store.new_iterator(b"", b"");
        assert!(!it.next());
        assert!(it.error().is_none());
        it.release();
        it.release();
    }

    #[test]
    fn batch_accepts_and_drops() {
        let store = DevNullStore::new();
        let mut batch = store.new_batch();
        batch.put(b"k", b"v").unwrap();
        batch.delete(b"k").unwrap();
        batch.delete_range(b"a", b"b").unwrap();
        assert_eq!(batch.value_size(), 0);
        assert!(batch.is_empty());
        batch.write().unwrap();
        batch.replay(&store).unwrap();
        batch.reset();
        assert!(!store.has(b"k").unwrap());
    }

    #[test]
    fn snapshot_release_is_uniform() {
        let store = DevNullStore::new();
        let mut snap = store.get_snapshot().unwrap();
        assert!(!snap.has(b"k").unwrap());
        assert!(collect_entries(snap.new_iterator(b"", b"")).is_empty());
        snap.release();
        snap.release();
        assert_eq!(snap.get(b"k").unwrap(), None);
    }

    #[test]
    fn lifecycle_operations_succeed() {
        let store: SharedStore = Arc::new(DevNullStore::new());
        assert_eq!(store.stat("anything").unwrap(), "");
        store.compact(b"", b"").unwrap();
        assert_eq!(store.ancient_datadir().unwrap(), None);
        store.close().unwrap();
        store.close().unwrap();
        store.destroy();
        store.destroy();
        // Still usable after close: it never held anything.
        store.put(b"k", b"v").unwrap();
    }
}
