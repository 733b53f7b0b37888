use std::ops::ControlFlow;
use std::sync::Arc;

use crate::{AccessMode, KvStore, ScanControl, StoreError};

/// A view of another store restricted to keys starting with `prefix`.
///
/// Lets the feature index and the concept dictionary share one backend
/// (one redb file, one redis database) without key collisions.
#[derive(Clone)]
pub struct NamespacedStore {
    inner: Arc<dyn KvStore>,
    prefix: Vec<u8>,
}

impl NamespacedStore {
    pub fn new(inner: Arc<dyn KvStore>, prefix: impl Into<Vec<u8>>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.prefix.len() + key.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(key);
        out
    }
}

impl KvStore for NamespacedStore {
    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    fn mode(&self) -> AccessMode {
        self.inner.mode()
    }

    fn is_persistent(&self) -> bool {
        self.inner.is_persistent()
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(&self.full_key(key))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.inner.put(&self.full_key(key), value)
    }

    fn put_many(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StoreError> {
        let entries = entries
            .into_iter()
            .map(|(key, value)| (self.full_key(&key), value))
            .collect();
        self.inner.put_many(entries)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.inner.delete(&self.full_key(key))
    }

    fn contains(&self, key: &[u8]) -> Result<bool, StoreError> {
        self.inner.contains(&self.full_key(key))
    }

    fn len(&self) -> Result<usize, StoreError> {
        let mut count = 0usize;
        self.scan(&mut |_, _| {
            count += 1;
            Ok(ControlFlow::Continue(()))
        })?;
        Ok(count)
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&[u8], &[u8]) -> Result<ScanControl, StoreError>,
    ) -> Result<(), StoreError> {
        let prefix = self.prefix.as_slice();
        self.inner.scan(&mut |key, value| match key.strip_prefix(prefix) {
            Some(rest) => visitor(rest, value),
            None => Ok(ControlFlow::Continue(())),
        })
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;

    #[test]
    fn namespaces_do_not_collide() {
        let shared: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
        let left = NamespacedStore::new(Arc::clone(&shared), b"ix/".to_vec());
        let right = NamespacedStore::new(Arc::clone(&shared), b"cd/".to_vec());

        left.put(b"k", b"left").unwrap();
        right.put(b"k", b"right").unwrap();

        assert_eq!(left.get(b"k").unwrap(), Some(b"left".to_vec()));
        assert_eq!(right.get(b"k").unwrap(), Some(b"right".to_vec()));
        assert_eq!(left.len().unwrap(), 1);
        assert_eq!(shared.len().unwrap(), 2);

        let mut seen = Vec::new();
        right
            .scan(&mut |key, value| {
                seen.push((key.to_vec(), value.to_vec()));
                Ok(ControlFlow::Continue(()))
            })
            .unwrap();
        assert_eq!(seen, vec![(b"k".to_vec(), b"right".to_vec())]);
    }
}
