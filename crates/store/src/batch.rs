//! Scoped batch writes.
//!
//! A [`WriteBatch`] buffers `put`s and hands them to the backend through
//! `put_many` once `batch_size` entries are pending. Dropping the handle
//! commits whatever is still pending; call [`WriteBatch::abort`] to discard it
//! instead.

use tracing::{debug, warn};

use crate::{KvStore, StoreError};

pub struct WriteBatch<'a> {
    store: &'a dyn KvStore,
    pending: Vec<(Vec<u8>, Vec<u8>)>,
    batch_size: usize,
    committed: usize,
    finished: bool,
}

impl<'a> WriteBatch<'a> {
    /// Start a batch. Fails fast on read-only stores and a zero batch size.
    pub fn new(store: &'a dyn KvStore, batch_size: usize) -> Result<Self, StoreError> {
        store.mode().ensure_writable("write_batch")?;
        if batch_size == 0 {
            return Err(StoreError::InvalidParameter(
                "batch_size must be greater than zero".into(),
            ));
        }
        Ok(Self {
            store,
            pending: Vec::with_capacity(batch_size),
            batch_size,
            committed: 0,
            finished: false,
        })
    }

    /// Buffer one write, flushing to the backend when the batch is full.
    pub fn add(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Result<(), StoreError> {
        self.pending.push((key.into(), value.into()));
        if self.pending.len() >= self.batch_size {
            self.flush_pending()?;
        }
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Entries already handed to the backend.
    pub fn committed(&self) -> usize {
        self.committed
    }

    /// Flush pending writes and the backend. Returns the total number of
    /// entries written through this handle.
    pub fn commit(mut self) -> Result<usize, StoreError> {
        self.finished = true;
        self.flush_pending()?;
        self.store.flush()?;
        Ok(self.committed)
    }

    /// Discard pending writes. Entries flushed by earlier auto-commits stay.
    /// Returns the number of discarded entries.
    pub fn abort(mut self) -> usize {
        self.finished = true;
        let discarded = self.pending.len();
        self.pending.clear();
        debug!(
            backend = self.store.backend_name(),
            discarded,
            committed = self.committed,
            "write batch aborted"
        );
        discarded
    }

    fn flush_pending(&mut self) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let entries = std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size));
        let count = entries.len();
        self.store.put_many(entries)?;
        self.committed += count;
        debug!(
            backend = self.store.backend_name(),
            keys = count,
            committed = self.committed,
            "write batch flushed"
        );
        Ok(())
    }
}

impl Drop for WriteBatch<'_> {
    fn drop(&mut self) {
        if self.finished || self.pending.is_empty() {
            return;
        }
        if let Err(err) = self.flush_pending() {
            warn!(
                backend = self.store.backend_name(),
                error = %err,
                "failed to flush write batch on drop"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccessMode, InMemoryStore};

    #[test]
    fn auto_flushes_at_batch_size() {
        let store = InMemoryStore::new();
        let mut batch = WriteBatch::new(&store, 2).unwrap();
        batch.add(b"a".to_vec(), b"1".to_vec()).unwrap();
        assert_eq!(store.len().unwrap(), 0);
        batch.add(b"b".to_vec(), b"2".to_vec()).unwrap();
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(batch.pending(), 0);
        batch.add(b"c".to_vec(), b"3".to_vec()).unwrap();
        assert_eq!(batch.commit().unwrap(), 3);
        assert_eq!(store.len().unwrap(), 3);
    }

    #[test]
    fn abort_discards_only_pending() {
        let store = InMemoryStore::new();
        let mut batch = WriteBatch::new(&store, 2).unwrap();
        for key in [b"a", b"b", b"c"] {
            batch.add(key.to_vec(), b"v".to_vec()).unwrap();
        }
        assert_eq!(batch.abort(), 1);
        assert_eq!(store.len().unwrap(), 2);
        assert!(!store.contains(b"c").unwrap());
    }

    #[test]
    fn drop_flushes_pending_writes() {
        let store = InMemoryStore::new();
        {
            let mut batch = WriteBatch::new(&store, 100).unwrap();
            batch.add(b"k".to_vec(), b"v".to_vec()).unwrap();
        }
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn read_only_store_rejects_batch() {
        let store = InMemoryStore::with_mode(AccessMode::ReadOnly);
        assert!(matches!(
            WriteBatch::new(&store, 10),
            Err(StoreError::AccessDenied { .. })
        ));
    }

    #[test]
    fn zero_batch_size_is_invalid() {
        let store = InMemoryStore::new();
        assert!(matches!(
            WriteBatch::new(&store, 0),
            Err(StoreError::InvalidParameter(_))
        ));
    }
}
