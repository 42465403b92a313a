use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};

/// Shared handle to a store. Every factory (producer, registry) hands these
/// out so callers never depend on a concrete backend.
pub type SharedStore = Arc<dyn Store>;

/// Callback run when a store's persisted state is destroyed.
///
/// Backends invoke the hook at most once, from [`Store::destroy`].
pub type DropHook = Box<dyn FnOnce() + Send>;

/// Read access to a keyspace.
pub trait KeyValueReader {
    /// Check whether `key` is present.
    fn has(&self, key: &[u8]) -> StoreResult<bool>;

    /// Read the value stored under `key`.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>>;
}

/// Write access to a keyspace.
pub trait KeyValueWriter {
    /// Insert or overwrite `key`. The value is copied; the caller may reuse
    /// its buffer after return.
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Remove `key`. Deleting an absent key is not an error.
    fn delete(&self, key: &[u8]) -> StoreResult<()>;

    /// Remove every key in `[start, end)`. An empty `end` removes everything
    /// from `start` onward.
    fn delete_range(&self, start: &[u8], end: &[u8]) -> StoreResult<()> {
        let _ = (start, end);
        Err(StoreError::Unsupported("delete_range"))
    }
}

impl<W: KeyValueWriter + ?Sized> KeyValueWriter for &W {
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        (**self).delete(key)
    }

    fn delete_range(&self, start: &[u8], end: &[u8]) -> StoreResult<()> {
        (**self).delete_range(start, end)
    }
}

impl<W: KeyValueWriter + ?Sized> KeyValueWriter for Arc<W> {
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        (**self).put(key, value)
    }

    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        (**self).delete(key)
    }

    fn delete_range(&self, start: &[u8], end: &[u8]) -> StoreResult<()> {
        (**self).delete_range(start, end)
    }
}

/// Something that can produce ordered iterators over its keyspace.
pub trait Iteratee {
    /// Create a binary-alphabetical iterator over the keys carrying `prefix`,
    /// starting at `prefix ++ start` (or the first key after it, if absent).
    ///
    /// Empty `prefix`/`start` mean "no bound".
    fn new_iterator(&self, prefix: &[u8], start: &[u8]) -> Box<dyn StoreIterator>;
}

/// Cursor over a contiguous, ascending slice of a keyspace.
///
/// The iterator starts positioned before the first entry; call
/// [`next`](StoreIterator::next) to advance.
pub trait StoreIterator: Send {
    /// Move to the next entry. Returns `false` once exhausted or released.
    fn next(&mut self) -> bool;

    /// Accumulated error, if any. Exhaustion is not an error.
    fn error(&self) -> Option<&StoreError>;

    /// Key of the current entry, or `None` before the first `next` and after
    /// exhaustion.
    fn key(&self) -> Option<&[u8]>;

    /// Value of the current entry.
    fn value(&self) -> Option<&[u8]>;

    /// Drop the iterator's view. Safe to call more than once.
    fn release(&mut self);
}

/// Write-only buffer that commits to its host store on
/// [`write`](Batch::write).
///
/// A batch is owned by a single caller; it is not safe to share one batch
/// between threads.
pub trait Batch: Send {
    /// Queue an insert.
    fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()>;

    /// Queue a removal.
    fn delete(&mut self, key: &[u8]) -> StoreResult<()>;

    /// Queue removal of every key in `[start, end)`.
    fn delete_range(&mut self, start: &[u8], end: &[u8]) -> StoreResult<()>;

    /// Bytes queued up for writing.
    fn value_size(&self) -> usize;

    /// Number of queued operations.
    fn len(&self) -> usize;

    /// Returns `true` if nothing is queued.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically apply every queued operation to the host store.
    fn write(&mut self) -> StoreResult<()>;

    /// Discard queued operations so the batch can be reused.
    fn reset(&mut self);

    /// Re-apply queued operations, in order, to another writer.
    fn replay(&self, writer: &dyn KeyValueWriter) -> StoreResult<()>;
}

/// Frozen, point-in-time view of a store.
///
/// After [`release`](Snapshot::release) the snapshot owns nothing and reports
/// an empty keyspace.
pub trait Snapshot: KeyValueReader + Iteratee + Send + Sync {
    /// Drop the view. Safe to call more than once.
    fn release(&mut self);
}

/// The capability set every backend and decorator implements.
///
/// Implementations must satisfy these invariants:
/// - Absence is `Ok(false)`/`Ok(None)`, never an error.
/// - Iteration is in ascending byte order.
/// - Snapshots ignore mutations made after they were taken.
/// - [`destroy`](Store::destroy) may be called any number of times.
pub trait Store: KeyValueReader + KeyValueWriter + Iteratee + Send + Sync {
    /// Create an empty batch bound to this store.
    fn new_batch(&self) -> Box<dyn Batch>;

    /// Take a snapshot of the current state.
    ///
    /// Fails if the store cannot provide a consistent view (e.g. it is
    /// closed). The snapshot must be released after use.
    fn get_snapshot(&self) -> StoreResult<Box<dyn Snapshot>>;

    /// Backend-specific diagnostic property.
    fn stat(&self, property: &str) -> StoreResult<String>;

    /// Flatten the given key range. Empty `start`/`limit` are unbounded.
    /// Backends without compaction succeed as a no-op.
    fn compact(&self, start: &[u8], limit: &[u8]) -> StoreResult<()>;

    /// Release resources held by the store.
    fn close(&self) -> StoreResult<()>;

    /// Irreversibly destroy persisted state and run the drop hook, if any.
    fn destroy(&self);

    /// Location of auxiliary archival storage, if the backend has one.
    fn ancient_datadir(&self) -> StoreResult<Option<PathBuf>> {
        Ok(None)
    }
}

/// Factory of named stores.
pub trait DbProducer: Send + Sync {
    /// Names of the databases that currently exist.
    fn names(&self) -> Vec<String>;

    /// Open the database called `name`, creating it if necessary.
    fn open_db(&self, name: &str) -> StoreResult<SharedStore>;
}
