use std::path::PathBuf;

/// Errors from key-value store operations.
///
/// A missing key is never an error: readers report absence as `Ok(false)` or
/// `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store has been closed and no longer serves data.
    #[error("store is closed")]
    Closed,

    /// The snapshot or iterator has already been released.
    #[error("handle already released")]
    Released,

    /// The backend does not implement the requested operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// `stat` was asked for a property the backend does not expose.
    #[error("unknown property: {0}")]
    UnknownProperty(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The database directory could not be created.
    #[error("cannot create database directory {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The storage engine failed to open the database at `path`.
    #[error("cannot open database at {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: Box<StoreError>,
    },

    /// Another handle holds the lock on the database directory.
    #[error("database directory {} is already in use", .0.display())]
    Locked(PathBuf),

    /// A database name that cannot be mapped to a directory.
    #[error("invalid database name: {0:?}")]
    InvalidName(String),

    /// Invalid backend or producer configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An internal lock was poisoned by a panicking writer.
    #[error("lock poisoned: {0}")]
    LockPoisoned(String),
}

impl StoreError {
    /// Wrap a lock poisoning error. Used with `map_err` on `RwLock`/`Mutex`
    /// guards.
    pub fn poisoned<E: std::fmt::Display>(err: E) -> Self {
        StoreError::LockPoisoned(err.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
