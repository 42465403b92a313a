//! Sub-keyspace views over a shared store.
//!
//! A [`Table`] confines every operation to keys starting with a fixed prefix
//! and hides that prefix from callers. [`ClosableTable`] adds ownership: its
//! `close` and `destroy` act on the underlying store, and `destroy` can be
//! suppressed for views that share a store they do not own.

pub mod closable;
pub mod table;

pub use closable::ClosableTable;
pub use table::Table;
