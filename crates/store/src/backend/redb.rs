//! Redb (Rust embedded database) backend.
//!
//! Redb is a pure Rust ACID key-value store. A database file can be held by a
//! single process at a time; a second open fails with
//! [`StoreError::Unavailable`] and should be reported as a setup error.
//!
//! # Configuration Example
//! ```yaml
//! store:
//!   backend:
//!     kind: redb
//!     path: "/data/facet.redb"
//!   mode: read_only
//! ```

use std::ops::ControlFlow;
use std::path::Path;

use redb::{
    Database, DatabaseError, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition, TableError,
};

use crate::{AccessMode, KvStore, ScanControl, StoreError};

const KV_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("facet_kv");

const BACKEND: &str = "redb";

fn unavailable<E: std::fmt::Display>(err: E) -> StoreError {
    StoreError::unavailable(BACKEND, err)
}

/// Redb-backed [`KvStore`]. Every write is its own committed transaction;
/// `put_many` commits the whole batch in one transaction.
pub struct RedbStore {
    db: Database,
    mode: AccessMode,
}

impl RedbStore {
    /// Open a database file.
    ///
    /// * `ReadOnly` requires the file to exist.
    /// * `ReadWrite` creates the file and table when missing.
    /// * `Create` drops and recreates the table.
    pub fn open<P: AsRef<Path>>(path: P, mode: AccessMode) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let db = match mode {
            AccessMode::ReadOnly => {
                if !path.exists() {
                    return Err(unavailable(format!(
                        "database file {} does not exist",
                        path.display()
                    )));
                }
                Database::open(path).map_err(map_open_error)?
            }
            AccessMode::ReadWrite | AccessMode::Create => {
                Database::create(path).map_err(map_open_error)?
            }
        };

        if mode.is_writable() {
            let write_txn = db.begin_write().map_err(unavailable)?;
            if mode.truncates() {
                write_txn.delete_table(KV_TABLE).map_err(unavailable)?;
            }
            {
                // Accessing the table creates it if it doesn't exist.
                let _table = write_txn.open_table(KV_TABLE).map_err(unavailable)?;
            }
            write_txn.commit().map_err(unavailable)?;
        }

        Ok(Self { db, mode })
    }
}

fn map_open_error(err: DatabaseError) -> StoreError {
    match err {
        DatabaseError::DatabaseAlreadyOpen => {
            unavailable("database is locked by another process or handle")
        }
        other => unavailable(other),
    }
}

impl KvStore for RedbStore {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn mode(&self) -> AccessMode {
        self.mode
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self.db.begin_read().map_err(unavailable)?;
        let table = match read_txn.open_table(KV_TABLE) {
            Ok(table) => table,
            // A read-only handle over a file that never had a write.
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(err) => return Err(unavailable(err)),
        };
        let value = table.get(key).map_err(unavailable)?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.mode.ensure_writable("put")?;
        let write_txn = self.db.begin_write().map_err(unavailable)?;
        {
            let mut table = write_txn.open_table(KV_TABLE).map_err(unavailable)?;
            table.insert(key, value).map_err(unavailable)?;
        }
        write_txn.commit().map_err(unavailable)
    }

    fn put_many(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StoreError> {
        self.mode.ensure_writable("put_many")?;
        if entries.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write().map_err(unavailable)?;
        {
            let mut table = write_txn.open_table(KV_TABLE).map_err(unavailable)?;
            for (key, value) in &entries {
                table
                    .insert(key.as_slice(), value.as_slice())
                    .map_err(unavailable)?;
            }
        }
        write_txn.commit().map_err(unavailable)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.mode.ensure_writable("delete")?;
        let write_txn = self.db.begin_write().map_err(unavailable)?;
        {
            let mut table = write_txn.open_table(KV_TABLE).map_err(unavailable)?;
            table.remove(key).map_err(unavailable)?;
        }
        write_txn.commit().map_err(unavailable)
    }

    fn len(&self) -> Result<usize, StoreError> {
        let read_txn = self.db.begin_read().map_err(unavailable)?;
        let table = match read_txn.open_table(KV_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(0),
            Err(err) => return Err(unavailable(err)),
        };
        let len = table.len().map_err(unavailable)?;
        Ok(len as usize)
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&[u8], &[u8]) -> Result<ScanControl, StoreError>,
    ) -> Result<(), StoreError> {
        let read_txn = self.db.begin_read().map_err(unavailable)?;
        let table = match read_txn.open_table(KV_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(()),
            Err(err) => return Err(unavailable(err)),
        };
        for item in table.iter().map_err(unavailable)? {
            let (key, value) = item.map_err(unavailable)?;
            if let ControlFlow::Break(()) = visitor(key.value(), value.value())? {
                break;
            }
        }
        Ok(())
    }
}
