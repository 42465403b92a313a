use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use kvdb_store::{StoreError, StoreResult};
use tracing::{debug, warn};

/// File name of the directory lock inside a database directory.
pub const LOCK_FILE: &str = "LOCK";

/// Exclusive OS-level lock on a database directory.
///
/// Released when dropped, or by the OS if the process dies.
pub(crate) struct DirLock {
    file: File,
    path: PathBuf,
}

impl DirLock {
    /// Lock `dir`, failing with [`StoreError::Locked`] if any other handle,
    /// in this process or another, holds it.
    pub(crate) fn acquire(dir: &Path) -> StoreResult<Self> {
        let path = dir.join(LOCK_FILE);
        let file = File::create(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(path = %path.display(), "acquired directory lock");
                Ok(Self { file, path })
            }
            Err(e) if is_contended(&e) => Err(StoreError::Locked(dir.to_path_buf())),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the lock file. Only called by `destroy`, while still holding the lock.
    pub(crate) fn remove(self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove lock file"),
        }
    }
}

impl Drop for DirLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "failed to release directory lock");
        }
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
