//! Key-value store contract and in-memory backends.
//!
//! Every storage backend and decorator in the workspace implements the
//! [`Store`] trait, so callers hold a [`SharedStore`] and never depend on a
//! concrete variant.
//!
//! # Satellite types
//!
//! - [`Batch`] -- buffered writes, committed atomically by `write`
//! - [`StoreIterator`] -- ascending cursor over a prefix-bounded range
//! - [`Snapshot`] -- frozen point-in-time view, inert after `release`
//!
//! # Backends
//!
//! - [`MemoryStore`] -- copy-on-write `BTreeMap` store for tests and embedding
//! - [`NamespaceRegistry`] / [`FakeFs`] -- named in-memory databases grouped
//!   into isolated namespaces, standing in for a directory of real databases
//!
//! # Design Rules
//!
//! 1. A missing key is `Ok(None)`/`Ok(false)`, never an error.
//! 2. Iteration is binary-lexicographic; iterators and snapshots do not see
//!    writes made after their creation.
//! 3. Releasing an iterator or snapshot twice, or destroying a store twice,
//!    is a no-op.
//! 4. Compaction and statistics are best-effort.

pub mod batch;
pub mod error;
pub mod iterator;
pub mod keys;
pub mod memory;
pub mod registry;
pub mod snapshot;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use batch::{BatchOp, BatchTarget, OpBatch};
pub use error::{StoreError, StoreResult};
pub use iterator::{collect_entries, EmptyIterator, KeyMap, MapIterator};
pub use memory::MemoryStore;
pub use registry::{unique_namespace, FakeFs, MemoryProducer, NamespaceRegistry};
pub use snapshot::FrozenSnapshot;
pub use traits::{
    Batch, DbProducer, DropHook, Iteratee, KeyValueReader, KeyValueWriter, SharedStore, Snapshot,
    Store, StoreIterator,
};
