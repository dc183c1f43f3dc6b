//! SQLite-backed credential store.
//!
//! A single database file with one `session_record` row keyed by the device
//! JID. WAL journaling plus `synchronous = FULL` make a committed save
//! survive a crash of this or any other process using the file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use log::{info, warn};
use rusqlite::{params, Connection, ErrorCode, TransactionBehavior};

use crate::store::{CredentialStore, SessionRecord, StoreError, StoreResult};

/// Current schema version, kept in `PRAGMA user_version`.
const SCHEMA_VERSION: i32 = 1;

/// How long a statement waits on another connection's lock.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase) => {
                StoreError::Corrupt(err.to_string())
            }
            Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
                StoreError::Io(format!("database is locked: {err}"))
            }
            _ => StoreError::Io(err.to_string()),
        }
    }
}

/// Durable single-record store in a SQLite file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and validate it.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.busy_timeout(busy_timeout)?;
        configure(&conn)?;
        verify(&conn)?;
        migrate(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Open the database, discarding and recreating it if it is corrupt.
    ///
    /// The stored record is read once as part of the check, so a damaged
    /// record is recovered here as well as a damaged file. Only a confirmed
    /// [`StoreError::Corrupt`] leads to deletion; lock contention and other
    /// I/O errors are returned as-is.
    pub fn open_or_recreate(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let opened = Self::open(path).and_then(|store| store.load().map(|_| store));
        let reason = match opened {
            Err(StoreError::Corrupt(reason)) => reason,
            other => return other,
        };

        warn!(target: "Store", "Database appears to be corrupted ({reason}), removing and creating new one");
        remove_database_files(path)?;
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Io("lock poisoned".to_string()))
    }
}

fn configure(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = FULL;
         PRAGMA cache_size = -2000;",
    )?;
    Ok(())
}

fn verify(conn: &Connection) -> StoreResult<()> {
    let check: String = conn.query_row("PRAGMA quick_check", [], |row| row.get(0))?;
    if check != "ok" {
        return Err(StoreError::Corrupt(format!("integrity check failed: {check}")));
    }

    let foreign_keys: i32 = conn.pragma_query_value(None, "foreign_keys", |row| row.get(0))?;
    if foreign_keys != 1 {
        return Err(StoreError::Corrupt("foreign keys are not enabled".to_string()));
    }
    Ok(())
}

fn migrate(conn: &Connection) -> StoreResult<()> {
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    match version {
        0 => {
            conn.execute_batch(
                "BEGIN IMMEDIATE;
                 CREATE TABLE IF NOT EXISTS session_record (
                     jid        TEXT PRIMARY KEY NOT NULL,
                     record     TEXT NOT NULL,
                     updated_at TEXT NOT NULL
                 );
                 PRAGMA user_version = 1;
                 COMMIT;",
            )?;
            info!(target: "Store", "Initialized credential store schema v{SCHEMA_VERSION}");
            Ok(())
        }
        SCHEMA_VERSION => Ok(()),
        other => Err(StoreError::Corrupt(format!(
            "unsupported schema version {other}"
        ))),
    }
}

fn remove_database_files(path: &Path) -> StoreResult<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        match fs::remove_file(&name) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(StoreError::Io(err.to_string())),
        }
    }
    Ok(())
}

impl CredentialStore for SqliteStore {
    fn load(&self) -> StoreResult<Option<SessionRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT jid, record FROM session_record")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let (jid, raw) = match rows.as_slice() {
            [] => return Ok(None),
            [row] => row,
            _ => {
                return Err(StoreError::Corrupt(format!(
                    "expected at most one device record, found {}",
                    rows.len()
                )))
            }
        };

        let record: SessionRecord = serde_json::from_str(raw)
            .map_err(|err| StoreError::Corrupt(format!("unreadable session record: {err}")))?;
        if record.identity.to_string() != *jid {
            return Err(StoreError::Corrupt(format!(
                "record for {} stored under key {jid}",
                record.identity
            )));
        }
        Ok(Some(record))
    }

    fn save(&self, record: &SessionRecord) -> StoreResult<()> {
        let serialized =
            serde_json::to_string(record).map_err(|err| StoreError::Io(err.to_string()))?;
        let jid = record.identity.to_string();

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM session_record WHERE jid != ?1", params![jid])?;
        tx.execute(
            "INSERT INTO session_record (jid, record, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(jid) DO UPDATE SET record = excluded.record, updated_at = excluded.updated_at",
            params![jid, serialized, record.updated_at.to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn clear(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM session_record", [])?;
        Ok(())
    }
}
