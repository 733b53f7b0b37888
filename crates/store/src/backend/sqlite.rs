//! SQLite backend: one `kv(key BLOB PRIMARY KEY, value BLOB)` table.
//!
//! The connection sits behind a mutex, so readers sharing one handle are
//! serialized. Open several read-only handles for parallel query workers.

use std::ops::ControlFlow;
use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension};

use crate::{AccessMode, KvStore, ScanControl, StoreError};

const BACKEND: &str = "sqlite";
const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

fn map_err(err: rusqlite::Error) -> StoreError {
    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            StoreError::unavailable(BACKEND, format!("database is locked: {err}"))
        }
        Some(ErrorCode::ReadOnly) => StoreError::AccessDenied { operation: "write" },
        _ => StoreError::unavailable(BACKEND, err),
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
    mode: AccessMode,
    /// False when a read-only open finds no `kv` table; such a store reads
    /// as empty.
    has_table: bool,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P, mode: AccessMode) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = match mode {
            AccessMode::ReadOnly => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(map_err)?,
            AccessMode::ReadWrite | AccessMode::Create => Connection::open(path).map_err(map_err)?,
        };
        conn.busy_timeout(BUSY_TIMEOUT).map_err(map_err)?;

        if mode.is_writable() {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 CREATE TABLE IF NOT EXISTS kv (key BLOB PRIMARY KEY, value BLOB NOT NULL);",
            )
            .map_err(map_err)?;
            if mode.truncates() {
                conn.execute("DELETE FROM kv", []).map_err(map_err)?;
            }
        }

        let has_table = mode.is_writable() || kv_table_exists(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            mode,
            has_table,
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_err)?;
        conn.execute_batch("CREATE TABLE kv (key BLOB PRIMARY KEY, value BLOB NOT NULL);")
            .map_err(map_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            mode: AccessMode::ReadWrite,
            has_table: true,
        })
    }
}

fn kv_table_exists(conn: &Connection) -> Result<bool, StoreError> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'kv'",
        [],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(map_err)
}

impl KvStore for SqliteStore {
    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn mode(&self) -> AccessMode {
        self.mode
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        if !self.has_table {
            return Ok(None);
        }
        let conn = self.conn.lock();
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get::<_, Vec<u8>>(0)
        })
        .optional()
        .map_err(map_err)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.mode.ensure_writable("put")?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .map_err(map_err)?;
        Ok(())
    }

    fn put_many(&self, entries: Vec<(Vec<u8>, Vec<u8>)>) -> Result<(), StoreError> {
        self.mode.ensure_writable("put_many")?;
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(map_err)?;
        {
            let mut stmt = tx
                .prepare_cached("INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)")
                .map_err(map_err)?;
            for (key, value) in &entries {
                stmt.execute(params![key, value]).map_err(map_err)?;
            }
        }
        tx.commit().map_err(map_err)
    }

    fn delete(&self, key: &[u8]) -> Result<(), StoreError> {
        self.mode.ensure_writable("delete")?;
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(map_err)?;
        Ok(())
    }

    fn len(&self) -> Result<usize, StoreError> {
        if !self.has_table {
            return Ok(0);
        }
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))
            .map_err(map_err)?;
        Ok(count as usize)
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&[u8], &[u8]) -> Result<ScanControl, StoreError>,
    ) -> Result<(), StoreError> {
        if !self.has_table {
            return Ok(());
        }
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT key, value FROM kv ORDER BY key")
            .map_err(map_err)?;
        let mut rows = stmt.query([]).map_err(map_err)?;
        while let Some(row) = rows.next().map_err(map_err)? {
            let key: Vec<u8> = row.get(0).map_err(map_err)?;
            let value: Vec<u8> = row.get(1).map_err(map_err)?;
            if let ControlFlow::Break(()) = visitor(&key, &value)? {
                break;
            }
        }
        Ok(())
    }
}
