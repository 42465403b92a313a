use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use crate::error::StoreError;
use crate::keys::join_key;
use crate::traits::StoreIterator;

/// Ordered key/value map used by the in-memory views.
pub type KeyMap = BTreeMap<Vec<u8>, Vec<u8>>;

/// Iterator over a point-in-time [`KeyMap`].
///
/// Holds its own reference to the map, so writes made to the host store
/// after creation are invisible. The cursor is re-seeked with a range lookup
/// on every step instead of borrowing the map.
pub struct MapIterator {
    map: Option<Arc<KeyMap>>,
    prefix: Vec<u8>,
    cursor: Bound<Vec<u8>>,
    current: Option<(Vec<u8>, Vec<u8>)>,
    error: Option<StoreError>,
}

impl MapIterator {
    /// Iterate `map` over keys carrying `prefix`, from `prefix ++ start`.
    pub fn new(map: Arc<KeyMap>, prefix: &[u8], start: &[u8]) -> Self {
        Self {
            map: Some(map),
            prefix: prefix.to_vec(),
            cursor: Bound::Included(join_key(prefix, start)),
            current: None,
            error: None,
        }
    }

    /// An exhausted iterator that reports `err` from [`error`](StoreIterator::error).
    pub fn failed(err: StoreError) -> Self {
        Self {
            map: None,
            prefix: Vec::new(),
            cursor: Bound::Unbounded,
            current: None,
            error: Some(err),
        }
    }
}

impl StoreIterator for MapIterator {
    fn next(&mut self) -> bool {
        let Some(map) = &self.map else {
            return false;
        };
        let lower = self.cursor.as_ref().map(Vec::as_slice);
        let found = map
            .range::<[u8], _>((lower, Bound::Unbounded))
            .next()
            .filter(|(k, _)| k.starts_with(&self.prefix))
            .map(|(k, v)| (k.clone(), v.clone()));

        match found {
            Some((key, value)) => {
                self.cursor = Bound::Excluded(key.clone());
                self.current = Some((key, value));
                true
            }
            None => {
                // Exhausted: let go of the view early.
                self.current = None;
                self.map = None;
                false
            }
        }
    }

    fn error(&self) -> Option<&StoreError> {
        self.error.as_ref()
    }

    fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(k, _)| k.as_slice())
    }

    fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|(_, v)| v.as_slice())
    }

    fn release(&mut self) {
        self.map = None;
        self.current = None;
    }
}

/// Iterator that never yields anything.
#[derive(Debug, Default)]
pub struct EmptyIterator;

impl StoreIterator for EmptyIterator {
    fn next(&mut self) -> bool {
        false
    }

    fn error(&self) -> Option<&StoreError> {
        None
    }

    fn key(&self) -> Option<&[u8]> {
        None
    }

    fn value(&self) -> Option<&[u8]> {
        None
    }

    fn release(&mut self) {}
}

/// Drain an iterator into owned pairs and release it.
pub fn collect_entries(mut it: Box<dyn StoreIterator>) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut out = Vec::new();
    while it.next() {
        if let (Some(k), Some(v)) = (it.key(), it.value()) {
            out.push((k.to_vec(), v.to_vec()));
        }
    }
    it.release();
    out
}
