//! Redis backend. Keys are namespaced under a prefix so several stores can
//! share one server; `put_many` is sent as a single pipeline.

use std::ops::ControlFlow;

use parking_lot::Mutex;
use redis::{Client, Connection};

use crate::{AccessMode, KvStore, ScanControl, StoreError};

const BACKEND: &str = "redis";
const SCAN_COUNT: usize = 1000;
const MGET_CHUNK: usize = 512;

fn unavailable(err: redis::RedisError) -> StoreError {
    StoreError::unavailable(BACKEND, err)
}

pub struct RedisStore {
    conn: Mutex<Connection>,
    prefix: Vec<u8>,
    mode: AccessMode,
}

impl RedisStore {
    /// Connect to `url`. `Create` deletes every key under `prefix`.
    ///
    /// The prefix is used verbatim in a `SCAN MATCH` pattern, so it must not
    /// contain glob metacharacters.
    pub fn open(url: &str, prefix: &str, mode: AccessMode) -> Result<Self, StoreError> {
        if prefix.contains(['*', '?', '[', ']']) {
            return Err(StoreError::InvalidParameter(format!(
                "redis key prefix {prefix:?} contains glob metacharacters"
            )));
        }
        let client = Client::open(url).map_err(unavailable)?;
        let conn = client.get_connection().map_err(unavailable)?;
        let store = Self {
            conn: Mutex::new(conn),
            prefix: prefix.as_bytes().to_vec(),
            mode,
        };
        if mode.truncates() {
            let keys = store.raw_keys()?;
            let mut conn = store.conn.lock();
            for chunk in keys.chunks(MGET_CHUNK) {
                redis::cmd("DEL")
                    .arg(chunk)
                    .query::<()>(&mut *conn)
                    .map_err(unavailable)?;
            }
        }
        Ok(store)
    }

    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.prefix.len() + key.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(key);
        out
    }

    /// Every prefixed key on the server, sorted.
    fn raw_keys(&self) -> Result<Vec<Vec<u8>>, StoreError> {
        let mut pattern = self.prefix.clone();
        pattern.push(b'*');
        let mut conn = self.conn.lock();
        let mut keys: Vec<Vec<u8>> = redis::cmd("SCAN")
            .cursor_arg(0)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(SCAN_COUNT)
            .clone()
            .iter::<Vec<u8>>(&mut *conn)
            .map_err(unavailable)?
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

impl KvStore for RedisStore {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn mode(&self) -> AccessMode {
        self.mode
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.lock();
        redis::cmd("GET")
            .arg(self.full_key(key))
            .query::<Option<Vec<u8>>>(&mut *conn)
            .map_err(unavailable)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.mode.ensure_writable("put")?;
        let mut conn = self.conn.lock();
        redis::cmd("SET")
            .arg(self.full_key(key))
            .arg(value)
            .query::<()>(&mut *conn)
            .map_err(unavailable)
    }

    fn put_many(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StoreError> {
        self.mode.ensure_writable("put_many")?;
        if entries.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in &entries {
            pipe.cmd("SET").arg(self.full_key(key)).arg(value).ignore();
        }
        let mut conn = self.conn.lock();
        pipe.query::<()>(&mut *conn).map_err(unavailable)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.mode.ensure_writable("delete")?;
        let mut conn = self.conn.lock();
        redis::cmd("DEL")
            .arg(self.full_key(key))
            .query::<()>(&mut *conn)
            .map_err(unavailable)
    }

    fn contains(&self, key: &[u8]) -> Result<bool, StoreError> {
        let mut conn = self.conn.lock();
        redis::cmd("EXISTS")
            .arg(self.full_key(key))
            .query::<bool>(&mut *conn)
            .map_err(unavailable)
    }

    fn len(&self) -> Result<usize, StoreError> {
        Ok(self.raw_keys()?.len())
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&[u8], &[u8]) -> Result<ScanControl, StoreError>,
    ) -> Result<(), StoreError> {
        let keys = self.raw_keys()?;
        for chunk in keys.chunks(MGET_CHUNK) {
            let values: Vec<Option<Vec<u8>>> = {
                let mut conn = self.conn.lock();
                redis::cmd("MGET")
                    .arg(chunk)
                    .query(&mut *conn)
                    .map_err(unavailable)?
            };
            for (key, value) in chunk.iter().zip(values) {
                // Deleted between SCAN and MGET.
                let Some(value) = value else { continue };
                if let ControlFlow::Break(()) = visitor(&key[self.prefix.len()..], &value)? {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_glob_prefix() {
        let err = RedisStore::open("redis://127.0.0.1/", "bad*", AccessMode::ReadWrite)
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::InvalidParameter(_)));
    }

    #[test]
    fn unreachable_server_is_unavailable() {
        // Port 1 is reserved; nothing listens there.
        let err = RedisStore::open("redis://127.0.0.1:1/", "facet:", AccessMode::ReadWrite)
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Unavailable { backend: "redis", .. }));
    }
}
