use std::sync::Arc;

use crate::error::StoreResult;
use crate::iterator::{EmptyIterator, KeyMap, MapIterator};
use crate::traits::{Iteratee, KeyValueReader, Snapshot, StoreIterator};

/// Snapshot backed by a shared, immutable [`KeyMap`].
///
/// Backends that keep their state in a copy-on-write map hand out the
/// current `Arc`; later writes clone the map instead of mutating it.
#[derive(Debug, Default)]
pub struct FrozenSnapshot {
    map: Option<Arc<KeyMap>>,
}

impl FrozenSnapshot {
    pub fn new(map: Arc<KeyMap>) -> Self {
        Self { map: Some(map) }
    }

    /// Whether the snapshot has been released.
    pub fn is_released(&self) -> bool {
        self.map.is_none()
    }

    /// Number of entries visible through the snapshot.
    pub fn len(&self) -> usize {
        self.map.as_ref().map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueReader for FrozenSnapshot {
    fn has(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.map.as_ref().is_some_and(|m| m.contains_key(key)))
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.map.as_ref().and_then(|m| m.get(key).cloned()))
    }
}

impl Iteratee for FrozenSnapshot {
    fn new_iterator(&self, prefix: &[u8], start: &[u8]) -> Box<dyn StoreIterator> {
        match &self.map {
            Some(map) => Box::new(MapIterator::new(Arc::clone(map), prefix, start)),
            None => Box::new(EmptyIterator),
        }
    }
}

impl Snapshot for FrozenSnapshot {
    fn release(&mut self) {
        self.map = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::collect_entries;

    fn frozen() -> FrozenSnapshot {
        let mut map = KeyMap::new();
        map.insert(b"k1".to_vec(), b"v1".to_vec());
        map.insert(b"k2".to_vec(), b"v2".to_vec());
        FrozenSnapshot::new(Arc::new(map))
    }

    #[test]
    fn reads_through_snapshot() {
        let snap = frozen();
        assert!(snap.has(b"k1").unwrap());
        assert_eq!(snap.get(b"k2").unwrap(), Some(b"v2".to_vec()));
        assert_eq!(snap.get(b"k3").unwrap(), None);
        assert_eq!(collect_entries(snap.new_iterator(b"k", b"")).len(), 2);
    }

    #[test]
    fn released_snapshot_is_empty_not_failing() {
        let mut snap = frozen();
        snap.release();
        assert!(snap.is_released());
        assert!(!snap.has(b"k1").unwrap());
        assert_eq!(snap.get(b"k1").unwrap(), None);
        assert!(collect_entries(snap.new_iterator(b"", b"")).is_empty());

        // Double release is a no-op.
        snap.release();
        assert!(snap.is_empty());
    }

    #[test]
    fn iterator_outlives_release() {
        let mut snap = frozen();
        let it = snap.new_iterator(b"", b"");
        snap.release();
        assert_eq!(collect_entries(it).len(), 2);
    }
}
