//! Namespace-isolated fake filesystem of in-memory databases.
//!
//! A [`NamespaceRegistry`] maps namespace ids to [`FakeFs`] instances; each
//! `FakeFs` maps database names to live [`MemoryStore`]s. Tests that need
//! several "on-disk" databases without touching the disk open them here, and
//! two namespaces never see each other's names.
//!
//! Locking is two-level: the registry lock is held only to look up or insert
//! a namespace, and every namespace guards its own name table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, Weak};

use rand::Rng;
use tracing::debug;

use crate::error::StoreResult;
use crate::memory::MemoryStore;
use crate::traits::{DbProducer, DropHook, SharedStore};

/// Length in bytes of a generated namespace id (before hex encoding).
const NAMESPACE_ID_LEN: usize = 32;

/// Generate a random, hex-encoded namespace id.
pub fn unique_namespace() -> String {
    let mut bytes = [0u8; NAMESPACE_ID_LEN];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Table of namespaces.
///
/// Construct one per test run (or use [`NamespaceRegistry::global`] for the
/// process-wide table) and pass it to whatever needs isolated fake databases.
#[derive(Debug, Default)]
pub struct NamespaceRegistry {
    namespaces: Mutex<HashMap<String, Arc<FakeFs>>>,
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry, created on first use.
    pub fn global() -> &'static NamespaceRegistry {
        static GLOBAL: OnceLock<NamespaceRegistry> = OnceLock::new();
        GLOBAL.get_or_init(NamespaceRegistry::new)
    }

    /// Get or create the namespace `namespace`.
    ///
    /// An empty id creates a fresh namespace with a random id; read it back
    /// with [`FakeFs::namespace`].
    pub fn namespace(&self, namespace: &str) -> Arc<FakeFs> {
        let namespace = if namespace.is_empty() {
            unique_namespace()
        } else {
            namespace.to_string()
        };

        let mut namespaces = self
            .namespaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let fs = namespaces
            .entry(namespace.clone())
            .or_insert_with(|| Arc::new(FakeFs::new(namespace)));
        Arc::clone(fs)
    }

    /// Ids of every namespace created so far.
    pub fn namespaces(&self) -> Vec<String> {
        self.namespaces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Shorthand for `namespace(ns).open_fake_db(name)`.
    pub fn open_fake_db(&self, namespace: &str, name: &str) -> SharedStore {
        self.namespace(namespace).open_fake_db(name)
    }

    /// Shorthand for `namespace(ns).list_fake_dbs()`.
    pub fn list_fake_dbs(&self, namespace: &str) -> Vec<String> {
        self.namespace(namespace).list_fake_dbs()
    }
}

/// A registered database. The generation tells a store's own drop hook apart
/// from a hook left behind by an earlier store with the same name.
struct FakeFile {
    generation: u64,
    store: SharedStore,
}

type FileTable = RwLock<HashMap<String, FakeFile>>;

/// One namespace: a name → in-memory store table.
pub struct FakeFs {
    namespace: String,
    files: Arc<FileTable>,
    next_generation: AtomicU64,
}

impl FakeFs {
    fn new(namespace: String) -> Self {
        Self {
            namespace,
            files: Arc::new(RwLock::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    /// This namespace's id.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Names of the databases currently registered. The result is a copy;
    /// order is unspecified.
    pub fn list_fake_dbs(&self) -> Vec<String> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Open the database `name`, creating an empty one on first use.
    ///
    /// Repeated calls return the same store until it is destroyed, at which
    /// point its name disappears from [`list_fake_dbs`](Self::list_fake_dbs).
    pub fn open_fake_db(&self, name: &str) -> SharedStore {
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(file) = files.get(name) {
            return Arc::clone(&file.store);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let hook = unregister_hook(Arc::downgrade(&self.files), name.to_string(), generation);
        let store: SharedStore = Arc::new(MemoryStore::with_drop_hook(hook));
        files.insert(
            name.to_string(),
            FakeFile {
                generation,
                store: Arc::clone(&store),
            },
        );

        debug!(namespace = %self.namespace, name, generation, "created fake db");
        store
    }
}

impl std::fmt::Debug for FakeFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeFs")
            .field("namespace", &self.namespace)
            .field("files", &self.list_fake_dbs())
            .finish()
    }
}

/// Hook that removes `name` from `files` if it still refers to `generation`.
fn unregister_hook(files: Weak<FileTable>, name: String, generation: u64) -> DropHook {
    Box::new(move || {
        let Some(files) = files.upgrade() else {
            return;
        };
        let mut files = files.write().unwrap_or_else(PoisonError::into_inner);
        if files.get(&name).is_some_and(|f| f.generation == generation) {
            files.remove(&name);
            debug!(name, generation, "removed fake db");
        }
    })
}

/// [`DbProducer`] over one namespace of fake databases.
#[derive(Debug, Clone)]
pub struct MemoryProducer {
    fs: Arc<FakeFs>,
}

impl MemoryProducer {
    /// Producer over `namespace` in `registry` (empty = fresh random one).
    pub fn new(registry: &NamespaceRegistry, namespace: &str) -> Self {
        Self {
            fs: registry.namespace(namespace),
        }
    }

    /// The namespace this producer opens databases in.
    pub fn fs(&self) -> &Arc<FakeFs> {
        &self.fs
    }
}

impl DbProducer for MemoryProducer {
    fn names(&self) -> Vec<String> {
        self.fs.list_fake_dbs()
    }

    fn open_db(&self, name: &str) -> StoreResult<SharedStore> {
        Ok(self.fs.open_fake_db(name))
    }
}
