//! Durable, file-backed key-value store.
//!
//! [`FileStore`] keeps its full index in memory and persists every committed
//! write to an append-only, CRC-checked data log. [`FileProducer`] maps
//! database names to subdirectories of a data directory and opens one store
//! per name, sized by a caller-supplied function or a [`ProducerConfig`].
//!
//! # Directory layout
//!
//! ```text
//! <datadir>/
//!   <name>/
//!     data.log
//!     LOCK
//! ```

pub mod config;
mod lock;
mod log;
pub mod producer;
pub mod store;

pub use config::{
    DbSizing, FileStoreOptions, ProducerConfig, SyncMode, MIN_CACHE_MIB, MIN_HANDLES,
};
pub use lock::LOCK_FILE;
pub use producer::{FileProducer, SizingFn};
pub use store::{FileStore, LOG_FILE};
