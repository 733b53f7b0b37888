//! Backend-agnostic key/value storage for the facet workspace.
//!
//! Every backend implements [`KvStore`] over opaque byte keys and values. The
//! store never interprets value content; callers pick a [`Serializer`] and an
//! optional [`Compression`] codec to turn domain values into bytes.
//!
//! Backends are selected at configuration time through [`BackendConfig`]:
//!
//! ```
//! use store::{AccessMode, BackendConfig};
//!
//! let store = BackendConfig::in_memory().open(AccessMode::ReadWrite).unwrap();
//! store.put(b"humerus", b"C0020164").unwrap();
//! assert_eq!(store.get(b"humerus").unwrap(), Some(b"C0020164".to_vec()));
//! ```
//!
//! Writes made in [`AccessMode::ReadOnly`] fail with [`StoreError::AccessDenied`];
//! connection or lock failures surface as [`StoreError::Unavailable`] and are
//! never retried here.

use std::fmt::Display;
use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod backend;
pub mod batch;
pub mod codec;
pub mod namespace;

pub use backend::{BackendConfig, InMemoryStore};
#[cfg(feature = "backend-redb")]
pub use backend::RedbStore;
#[cfg(feature = "backend-redis")]
pub use backend::RedisStore;
#[cfg(feature = "backend-sqlite")]
pub use backend::SqliteStore;
pub use batch::WriteBatch;
pub use codec::{Compression, Serializer};
pub use namespace::NamespacedStore;

/// Result of a scan visitor: keep going or stop early.
pub type ScanControl = ControlFlow<()>;

/// How a store is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Reads only; every mutation fails with [`StoreError::AccessDenied`].
    ReadOnly,
    /// Open existing content (creating the store if missing) for reading and writing.
    #[default]
    ReadWrite,
    /// Open for writing and truncate whatever was there before.
    Create,
}

impl AccessMode {
    pub fn is_writable(self) -> bool {
        !matches!(self, AccessMode::ReadOnly)
    }

    pub fn truncates(self) -> bool {
        matches!(self, AccessMode::Create)
    }

    /// Fails with [`StoreError::AccessDenied`] unless the mode allows writes.
    pub fn ensure_writable(self, operation: &'static str) -> Result<(), StoreError> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(StoreError::AccessDenied { operation })
        }
    }
}

/// Errors raised by stores, codecs and batch handles.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("access denied: `{operation}` is not allowed on a read-only store")]
    AccessDenied { operation: &'static str },
    #[error("{backend} store unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },
    #[error("codec error: {0}")]
    Codec(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl StoreError {
    pub fn unavailable<E: Display>(backend: &'static str, err: E) -> Self {
        Self::Unavailable {
            backend,
            reason: err.to_string(),
        }
    }

    pub fn codec<E: Display>(err: E) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Uniform key/value contract shared by every backend.
///
/// Implementations must be safe for many concurrent readers. Writers are
/// expected to be serialized by the caller (single-writer install phase).
pub trait KvStore: Send + Sync {
    /// Short backend name used in logs and errors.
    fn backend_name(&self) -> &'static str;

    /// Mode the store was opened with.
    fn mode(&self) -> AccessMode;

    /// Whether written records outlive the process.
    fn is_persistent(&self) -> bool {
        true
    }

    /// Retrieve a value by key. A missing key is `Ok(None)`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Insert or replace a single key.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;

    /// Insert or replace many keys in one backend round trip or transaction.
    /// Later entries win when a key repeats.
    fn put_many(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StoreError>;

    /// Remove a key. Removing a missing key is not an error.
    fn delete(&self, key: &[u8]) -> Result<(), StoreError>;

    fn contains(&self, key: &[u8]) -> Result<bool, StoreError> {
        Ok(self.get(key)?.is_some())
    }

    /// Number of stored keys.
    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    /// Visit every `(key, value)` pair. Returning `ControlFlow::Break` stops
    /// the scan; calling `scan` again restarts from the beginning.
    ///
    /// The visitor must not write to the same store.
    fn scan(
        &self,
        visitor: &mut dyn FnMut(&[u8], &[u8]) -> Result<ScanControl, StoreError>,
    ) -> Result<(), StoreError>;

    /// Flush buffered writes, if the backend buffers any.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Collect every key/value pair of a store into a vector, in scan order.
pub fn collect_entries(store: &dyn KvStore) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
    let mut out = Vec::new();
    store.scan(&mut |key, value| {
        out.push((key.to_vec(), value.to_vec()));
        Ok(ControlFlow::Continue(()))
    })?;
    Ok(out)
}
