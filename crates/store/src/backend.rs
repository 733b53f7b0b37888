use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{AccessMode, KvStore, ScanControl, StoreError};

/// Configuration for selecting and opening a backend.
///
/// # Example
/// ```
/// use store::BackendConfig;
///
/// // In-memory (for testing)
/// let config = BackendConfig::in_memory();
///
/// // Redb file (pure Rust, default file backend)
/// let config = BackendConfig::redb("/data/facet.redb");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    /// A `BTreeMap` behind a lock. Contents live as long as the process.
    #[default]
    InMemory,
    /// Redb embedded database file. Requires the `backend-redb` feature.
    Redb { path: PathBuf },
    /// SQLite database file with a single `kv` table. Requires `backend-sqlite`.
    Sqlite { path: PathBuf },
    /// Redis server; every key is stored under `prefix`. Requires `backend-redis`.
    Redis {
        url: String,
        #[serde(default = "default_redis_prefix")]
        prefix: String,
    },
}

fn default_redis_prefix() -> String {
    "facet:".to_string()
}

impl BackendConfig {
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    pub fn redb<P: Into<PathBuf>>(path: P) -> Self {
        BackendConfig::Redb { path: path.into() }
    }

    pub fn sqlite<P: Into<PathBuf>>(path: P) -> Self {
        BackendConfig::Sqlite { path: path.into() }
    }

    pub fn redis<U: Into<String>>(url: U) -> Self {
        BackendConfig::Redis {
            url: url.into(),
            prefix: default_redis_prefix(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackendConfig::InMemory => "memory",
            BackendConfig::Redb { .. } => "redb",
            BackendConfig::Sqlite { .. } => "sqlite",
            BackendConfig::Redis { .. } => "redis",
        }
    }

    /// Open the configured backend in the given mode.
    ///
    /// Backends compiled out of this build fail with
    /// [`StoreError::Unavailable`] rather than panicking.
    pub fn open(&self, mode: AccessMode) -> Result<Arc<dyn KvStore>, StoreError> {
        tracing::debug!(backend = self.name(), ?mode, "opening store");
        match self {
            BackendConfig::InMemory => Ok(Arc::new(InMemoryStore::with_mode(mode))),
            BackendConfig::Redb { path } => {
                #[cfg(feature = "backend-redb")]
                {
                    Ok(Arc::new(RedbStore::open(path, mode)?))
                }
                #[cfg(not(feature = "backend-redb"))]
                {
                    let _ = path;
                    Err(StoreError::unavailable(
                        "redb",
                        "redb backend disabled at compile time",
                    ))
                }
            }
            BackendConfig::Sqlite { path } => {
                #[cfg(feature = "backend-sqlite")]
                {
                    Ok(Arc::new(SqliteStore::open(path, mode)?))
                }
                #[cfg(not(feature = "backend-sqlite"))]
                {
                    let _ = path;
                    Err(StoreError::unavailable(
                        "sqlite",
                        "sqlite backend disabled at compile time",
                    ))
                }
            }
            BackendConfig::Redis { url, prefix } => {
                #[cfg(feature = "backend-redis")]
                {
                    Ok(Arc::new(RedisStore::open(url, prefix, mode)?))
                }
                #[cfg(not(feature = "backend-redis"))]
                {
                    let _ = (url, prefix);
                    Err(StoreError::unavailable(
                        "redis",
                        "redis backend disabled at compile time",
                    ))
                }
            }
        }
    }
}

type Records = Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>;

/// An in-memory backend using a `RwLock` around a `BTreeMap`.
///
/// Handles created with [`InMemoryStore::reopen`] share the same records, so a
/// test can install through a writable handle and query through a read-only one.
#[derive(Clone)]
pub struct InMemoryStore {
    records: Records,
    mode: AccessMode,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_mode(AccessMode::ReadWrite)
    }

    pub fn with_mode(mode: AccessMode) -> Self {
        Self {
            records: Arc::new(RwLock::new(BTreeMap::new())),
            mode,
        }
    }

    /// Another handle over the same records with a different access mode.
    /// `Create` clears the shared records.
    pub fn reopen(&self, mode: AccessMode) -> Self {
        if mode.truncates() {
            self.records.write().clear();
        }
        Self {
            records: Arc::clone(&self.records),
            mode,
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn mode(&self) -> AccessMode {
        self.mode
    }

    fn is_persistent(&self) -> bool {
        false
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.records.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.mode.ensure_writable("put")?;
        self.records.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn put_many(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StoreError> {
        self.mode.ensure_writable("put_many")?;
        // A single write lock is held for the entire batch.
        let mut guard = self.records.write();
        for (key, value) in entries {
            guard.insert(key, value);
        }
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.mode.ensure_writable("delete")?;
        self.records.write().remove(key);
        Ok(())
    }

    fn contains(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.records.read().contains_key(key))
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.records.read().len())
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&[u8], &[u8]) -> Result<ScanControl, StoreError>,
    ) -> Result<(), StoreError> {
        let guard = self.records.read();
        for (key, value) in guard.iter() {
            if let ControlFlow::Break(()) = visitor(key, value)? {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(feature = "backend-redb")]
pub mod redb;
#[cfg(feature = "backend-redb")]
pub use self::redb::RedbStore;

#[cfg(feature = "backend-sqlite")]
pub mod sqlite;
#[cfg(feature = "backend-sqlite")]
pub use self::sqlite::SqliteStore;

#[cfg(feature = "backend-redis")]
pub mod redis;
#[cfg(feature = "backend-redis")]
pub use self::redis::RedisStore;
