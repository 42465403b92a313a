//! Fault-injecting store decorator.
//!
//! [`Fallible`] wraps any store and simulates a process crash after a fixed
//! number of writes, so crash-recovery paths of higher layers can be tested
//! deterministically.
//!
//! Counted operations are `put`, `close` and `destroy`. Each one atomically
//! decrements the write budget; when the result is negative the operation
//! panics with [`WRITE_LIMIT_EXCEEDED`] instead of reaching the wrapped store.
//! Everything else, `delete` and `delete_range` included, passes straight
//! through without touching the budget. Consumers' tests rely on that exact
//! split, so it is kept as is.
//!
//! The budget starts at zero: call [`Fallible::set_write_count`] before use,
//! or the first counted operation aborts.

use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};

use kvdb_store::{
    Batch, Iteratee, KeyValueReader, KeyValueWriter, SharedStore, Snapshot, Store, StoreIterator,
    StoreResult,
};
use tracing::error;

/// Panic message raised when the write budget is exhausted.
pub const WRITE_LIMIT_EXCEEDED: &str = "write limit is over";

/// Store wrapper that panics once its write budget runs out.
pub struct Fallible {
    underlying: SharedStore,
    writes: AtomicI32,
}

impl Fallible {
    /// Wrap `store` with a budget of zero. Set it with
    /// [`set_write_count`](Self::set_write_count).
    pub fn wrap(store: SharedStore) -> Self {
        Self {
            underlying: store,
            writes: AtomicI32::new(0),
        }
    }

    /// Set the number of counted operations allowed before the crash.
    pub fn set_write_count(&self, n: i32) {
        self.writes.store(n, Ordering::SeqCst);
    }

    /// Remaining budget. Goes negative once exhausted.
    pub fn write_count(&self) -> i32 {
        self.writes.load(Ordering::SeqCst)
    }

    /// The wrapped store.
    pub fn underlying(&self) -> &SharedStore {
        &self.underlying
    }

    /// Spend one unit of budget, aborting if none is left.
    fn count(&self, op: &'static str) {
        let left = self.writes.fetch_sub(1, Ordering::SeqCst) - 1;
        if left < 0 {
            error!(op, "write budget exhausted; simulating crash");
            panic!("{WRITE_LIMIT_EXCEEDED}");
        }
    }
}

impl KeyValueReader for Fallible {
    fn has(&self, key: &[u8]) -> StoreResult<bool> {
        self.underlying.has(key)
    }

    fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.underlying.get(key)
    }
}

impl KeyValueWriter for Fallible {
    fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.count("put");
        self.underlying.put(key, value)
    }

    // Not counted.
    fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.underlying.delete(key)
    }

    fn delete_range(&self, start: &[u8], end: &[u8]) -> StoreResult<()> {
        self.underlying.delete_range(start, end)
    }
}

impl Iteratee for Fallible {
    fn new_iterator(&self, prefix: &[u8], start: &[u8]) -> Box<dyn StoreIterator> {
        self.underlying.new_iterator(prefix, start)
    }
}

impl Store for Fallible {
    fn new_batch(&self) -> Box<dyn Batch> {
        self.underlying.new_batch()
    }

    fn get_snapshot(&self) -> StoreResult<Box<dyn Snapshot>> {
        self.underlying.get_snapshot()
    }

    fn stat(&self, property: &str) -> StoreResult<String> {
        self.underlying.stat(property)
    }

    fn compact(&self, start: &[u8], limit: &[u8]) -> StoreResult<()> {
        self.underlying.compact(start, limit)
    }

    fn close(&self) -> StoreResult<()> {
        self.count("close");
        self.underlying.close()
    }

    fn destroy(&self) {
        self.count("destroy");
        self.underlying.destroy()
    }

    fn ancient_datadir(&self) -> StoreResult<Option<PathBuf>> {
        self.underlying.ancient_datadir()
    }
}

impl std::fmt::Debug for Fallible {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fallible")
            .field("writes", &self.write_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::Arc;
    use std::thread;

    use kvdb_store::testing::run_store_contract;
    use kvdb_store::MemoryStore;
    use proptest::prelude::*;

    use super::*;

    fn wrapped() -> (Arc<MemoryStore>, Fallible) {
        let mem = Arc::new(MemoryStore::new());
        let fallible = Fallible::wrap(Arc::clone(&mem) as SharedStore);
        (mem, fallible)
    }

    #[test]
    fn satisfies_store_contract_with_budget() {
        let (_, fallible) = wrapped();
        fallible.set_write_count(1_000);
        run_store_contract(&fallible);
    }

    #[test]
    fn set_then_get_write_count() {
        let (_, fallible) = wrapped();
        assert_eq!(fallible.write_count(), 0);
        fallible.set_write_count(7);
        assert_eq!(fallible.write_count(), 7);
    }

    #[test]
    fn puts_decrement_budget() {
        let (mem, fallible) = wrapped();
        fallible.set_write_count(3);
        fallible.put(b"a", b"1").unwrap();
        assert_eq!(fallible.write_count(), 2);
        fallible.put(b"b", b"2").unwrap();
        assert_eq!(fallible.write_count(), 1);
        assert_eq!(mem.len(), 2);
    }

    #[test]
    #[should_panic(expected = "write limit is over")]
    fn default_budget_aborts_first_put() {
        let (_, fallible) = wrapped();
        let _ = fallible.put(b"k", b"v");
    }

    #[test]
    fn exhausted_put_never_reaches_underlying() {
        let (mem, fallible) = wrapped();
        fallible.set_write_count(1);
        fallible.put(b"first", b"1").unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| fallible.put(b"second", b"2")));
        assert!(result.is_err());
        assert!(mem.has(b"first").unwrap());
        assert!(!mem.has(b"second").unwrap());
        assert_eq!(fallible.write_count(), -1);
    }

    #[test]
    #[should_panic(expected = "write limit is over")]
    fn close_is_counted() {
        let (_, fallible) = wrapped();
        let _ = fallible.close();
    }

    #[test]
    #[should_panic(expected = "write limit is over")]
    fn destroy_is_counted() {
        let (_, fallible) = wrapped();
        fallible.destroy();
    }

    #[test]
    fn close_within_budget_closes_underlying() {
        let (mem, fallible) = wrapped();
        fallible.set_write_count(1);
        fallible.close().unwrap();
        assert!(mem.is_closed());
        assert_eq!(fallible.write_count(), 0);
    }

    #[test]
    fn uncounted_operations_pass_through() {
        let (mem, fallible) = wrapped();
        mem.put(b"k", b"v").unwrap();

        // Budget is zero: none of these may abort.
        assert!(fallible.has(b"k").unwrap());
        assert_eq!(fallible.get(b"k").unwrap(), Some(b"v".to_vec()));
        let mut it = fallible.new_iterator(b"", b"");
        assert!(it.next());
        it.release();
        let mut snap = fallible.get_snapshot().unwrap();
        snap.release();
        assert_eq!(fallible.stat("len").unwrap(), "1");
        fallible.compact(b"", b"").unwrap();
        assert_eq!(fallible.ancient_datadir().unwrap(), None);

        fallible.delete(b"k").unwrap();
        fallible.delete_range(b"", b"").unwrap();
        assert!(!mem.has(b"k").unwrap());
        assert_eq!(fallible.write_count(), 0);
    }

    #[test]
    fn batches_bypass_the_budget() {
        let (mem, fallible) = wrapped();
        let mut batch = fallible.new_batch();
        batch.put(b"k", b"v").unwrap();
        batch.write().unwrap();
        assert!(mem.has(b"k").unwrap());
        assert_eq!(fallible.write_count(), 0);
    }

    #[test]
    fn concurrent_budget_is_exact() {
        let (mem, fallible) = wrapped();
        fallible.set_write_count(100);
        let fallible = Arc::new(fallible);

        let handles: Vec<_> = (0..8u8)
            .map(|t| {
                let fallible = Arc::clone(&fallible);
                thread::spawn(move || {
                    let mut ok = 0usize;
                    for i in 0..20u8 {
                        let put = || fallible.put(&[t, i], b"v");
                        let attempt = catch_unwind(AssertUnwindSafe(put));
                        if attempt.is_ok() {
                            ok += 1;
                        }
                    }
                    ok
                })
            })
            .collect();

        let succeeded: usize = handles
            .into_iter()
            .map(|h| h.join().expect("thread should not panic"))
            .sum();
        assert_eq!(succeeded, 100);
        assert_eq!(mem.len(), 100);
        assert_eq!(fallible.write_count(), 100 - 160);
    }

    proptest! {
        #[test]
        fn exactly_budget_puts_succeed(budget in 0i32..16) {
            let (mem, fallible) = wrapped();
            fallible.set_write_count(budget);
            let mut succeeded = 0;
            for i in 0..20u8 {
                let attempt = catch_unwind(AssertUnwindSafe(|| fallible.put(&[i], b"v")));
                if attempt.is_err() {
                    break;
                }
                succeeded += 1;
            }
            prop_assert_eq!(succeeded, budget);
            prop_assert_eq!(mem.len(), budget as usize);
        }
    }
}
