//! SQLite-backed storage driver.
//!
//! Each database name maps to one SQLite file; each store is a table
//! (`store_<store_name>`, clear of SQLite's reserved `sqlite_` names) with
//! an autoincrement id (insertion order), a unique key and an untyped value
//! column so text and blob storage classes are both kept as written.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};
use std::sync::Arc;
use std::time::Duration;

use super::Driver;
use super::shared::prepare_dir;
use crate::config::StoreConfig;
use crate::error::{BackendErrorKind, Error, Result};
use crate::paths;
use crate::serializer::{self, Native};
use crate::value::Value;

pub(crate) const NAME: &str = "sqlite";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite storage driver bound to one store.
///
/// `SqliteDriver` is `Clone`; clones share one connection, serialized by a
/// mutex. Separate stores open separate connections to the same file.
#[derive(Clone)]
pub struct SqliteDriver {
    conn: Arc<Mutex<Connection>>,
    table: Arc<str>,
}

impl SqliteDriver {
    /// Opens (or creates) the database for `config` and prepares the
    /// store's table.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory or database file cannot be
    /// created, or the schema cannot be initialized.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let dir = prepare_dir(NAME, &config.resolved_data_dir())?;
        let path = paths::sqlite_path(&dir, &config.name);

        let conn = Connection::open(&path)
            .map_err(|e| backend_err(&format!("open {}", path.display()), e))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| backend_err("set busy timeout", e))?;

        if config.size > 0 {
            // Negative cache_size is in KiB.
            let kib = i64::try_from(config.size / 1024).unwrap_or(i64::MAX).max(1);
            conn.execute_batch(&format!("PRAGMA cache_size = -{kib}"))
                .map_err(|e| backend_err("set cache size", e))?;
        }

        let stored: i64 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(|e| backend_err("read user_version", e))?;
        let version = i64::from(config.version);
        if stored > version {
            tracing::warn!(
                stored,
                requested = version,
                "Database has a newer schema version than requested"
            );
        } else if stored < version {
            conn.execute_batch(&format!("PRAGMA user_version = {version}"))
                .map_err(|e| backend_err("write user_version", e))?;
        }

        let driver = Self {
            conn: Arc::new(Mutex::new(conn)),
            table: Arc::from(format!("store_{}", config.store_name)),
        };
        driver.ensure_table(&driver.conn.lock())?;

        tracing::debug!(path = %path.display(), table = %driver.table, "Opened sqlite store");
        Ok(driver)
    }

    /// Probe: SQLite must be usable and the data directory writable.
    pub fn probe(config: &StoreConfig) -> bool {
        Connection::open_in_memory().is_ok() && paths::is_writable_dir(&config.resolved_data_dir())
    }

    fn ensure_table(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT UNIQUE NOT NULL,
                value
            )",
            self.table
        ))
        .map_err(|e| backend_err("create store table", e))
    }

    /// Runs `f` inside one transaction on a table that is known to exist.
    fn with_tx<T>(&self, op: &str, f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| txn_err(&format!("begin {op}"), e))?;
        self.ensure_table(&tx)?;
        let out = f(&tx)?;
        tx.commit().map_err(|e| txn_err(&format!("commit {op}"), e))?;
        Ok(out)
    }

    fn get_sync(&self, key: &str) -> Result<Option<Value>> {
        let sql = format!("SELECT value FROM \"{}\" WHERE key = ?1", self.table);
        let stored = self.with_tx("get", |tx| {
            tx.query_row(&sql, [key], |row| row.get::<_, SqlValue>(0))
                .optional()
                .map_err(|e| backend_err(&format!("read key '{key}'"), e))
        })?;
        stored.map(decode).transpose()
    }

    fn set_sync(&self, key: &str, value: Value) -> Result<Value> {
        let encoded = match serializer::to_native(&value)? {
            Native::Text(text) => SqlValue::Text(text),
            Native::Blob(bytes) => SqlValue::Blob(bytes),
        };
        let sql = format!(
            "INSERT INTO \"{}\" (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            self.table
        );
        self.with_tx("set", |tx| {
            tx.execute(&sql, params![key, encoded])
                .map_err(|e| backend_err(&format!("write key '{key}'"), e))
        })?;
        Ok(value)
    }

    fn remove_sync(&self, key: &str) -> Result<()> {
        let sql = format!("DELETE FROM \"{}\" WHERE key = ?1", self.table);
        self.with_tx("remove", |tx| {
            tx.execute(&sql, [key])
                .map_err(|e| backend_err(&format!("remove key '{key}'"), e))
        })?;
        Ok(())
    }

    fn clear_sync(&self) -> Result<()> {
        let sql = format!("DELETE FROM \"{}\"", self.table);
        self.with_tx("clear", |tx| {
            tx.execute(&sql, [])
                .map_err(|e| backend_err("clear store table", e))
        })?;
        Ok(())
    }

    fn drop_sync(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(&format!("DROP TABLE IF EXISTS \"{}\"", self.table))
            .map_err(|e| backend_err("drop store table", e))
    }

    fn length_sync(&self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", self.table);
        let count: i64 = self.with_tx("length", |tx| {
            tx.query_row(&sql, [], |row| row.get(0))
                .map_err(|e| backend_err("count entries", e))
        })?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn key_sync(&self, index: u64) -> Result<Option<String>> {
        let Ok(offset) = i64::try_from(index) else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT key FROM \"{}\" ORDER BY id LIMIT 1 OFFSET ?1",
            self.table
        );
        self.with_tx("key", |tx| {
            tx.query_row(&sql, [offset], |row| row.get(0))
                .optional()
                .map_err(|e| backend_err("read key by index", e))
        })
    }

    fn keys_sync(&self) -> Result<Vec<String>> {
        let sql = format!("SELECT key FROM \"{}\" ORDER BY id", self.table);
        self.with_tx("keys", |tx| {
            let mut stmt = tx
                .prepare(&sql)
                .map_err(|e| backend_err("prepare key scan", e))?;
            let keys = stmt
                .query_map([], |row| row.get(0))
                .map_err(|e| backend_err("scan keys", e))?
                .collect::<rusqlite::Result<Vec<String>>>()
                .map_err(|e| backend_err("read key", e))?;
            Ok(keys)
        })
    }

    fn entries_sync(&self) -> Result<Vec<(String, Value)>> {
        let sql = format!("SELECT key, value FROM \"{}\" ORDER BY id", self.table);
        let rows = self.with_tx("entries", |tx| {
            let mut stmt = tx
                .prepare(&sql)
                .map_err(|e| backend_err("prepare entry scan", e))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, SqlValue>(1)?)))
                .map_err(|e| backend_err("scan entries", e))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| backend_err("read entry", e))?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(key, stored)| Ok((key, decode(stored)?)))
            .collect()
    }
}

fn decode(stored: SqlValue) -> Result<Value> {
    match stored {
        SqlValue::Text(text) => serializer::from_native(Native::Text(text)),
        SqlValue::Blob(bytes) => serializer::from_native(Native::Blob(bytes)),
        other => Err(Error::serialization(format!(
            "unexpected SQLite storage class {:?}",
            other.data_type()
        ))),
    }
}

/// Maps a SQLite failure into the shared taxonomy.
fn backend_err(op: &str, err: rusqlite::Error) -> Error {
    let kind = match err.sqlite_error_code() {
        Some(ErrorCode::DiskFull | ErrorCode::TooBig) => BackendErrorKind::QuotaExceeded,
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            BackendErrorKind::ConnectionBlocked
        },
        Some(
            ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure
            | ErrorCode::ReadOnly
            | ErrorCode::PermissionDenied,
        ) => BackendErrorKind::Io,
        Some(ErrorCode::OperationAborted | ErrorCode::ConstraintViolation) => {
            BackendErrorKind::TransactionAborted
        },
        _ => BackendErrorKind::Other,
    };
    Error::backend(NAME, kind, format!("{op}: {err}"))
}

fn txn_err(op: &str, err: rusqlite::Error) -> Error {
    match backend_err(op, err) {
        Error::Backend {
            kind: BackendErrorKind::Other,
            message,
            ..
        } => Error::backend(NAME, BackendErrorKind::TransactionAborted, message),
        other => other,
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn get_item(&self, key: &str) -> Result<Option<Value>> {
        let driver = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || driver.get_sync(&key)).await?
    }

    async fn set_item(&self, key: &str, value: Value) -> Result<Value> {
        let driver = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || driver.set_sync(&key, value)).await?
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        let driver = self.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || driver.remove_sync(&key)).await?
    }

    async fn clear(&self) -> Result<()> {
        let driver = self.clone();
        tokio::task::spawn_blocking(move || driver.clear_sync()).await?
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let driver = self.clone();
        tokio::task::spawn_blocking(move || driver.keys_sync()).await?
    }

    async fn entries(&self) -> Result<Vec<(String, Value)>> {
        let driver = self.clone();
        tokio::task::spawn_blocking(move || driver.entries_sync()).await?
    }

    async fn drop_store(&self) -> Result<()> {
        let driver = self.clone();
        tokio::task::spawn_blocking(move || driver.drop_sync()).await?
    }

    async fn length(&self) -> Result<u64> {
        let driver = self.clone();
        tokio::task::spawn_blocking(move || driver.length_sync()).await?
    }

    async fn key(&self, index: u64) -> Result<Option<String>> {
        let driver = self.clone();
        tokio::task::spawn_blocking(move || driver.key_sync(index)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(tmp: &TempDir) -> StoreConfig {
        StoreConfig::new("sqltest").with_data_dir(tmp.path())
    }

    #[tokio::test]
    async fn test_blob_stored_as_blob_class() {
        let tmp = TempDir::new().unwrap();
        let driver = SqliteDriver::open(&config(&tmp)).unwrap();
        driver.set_item("bin", Value::Blob(vec![0, 255])).await.unwrap();
        driver.set_item("txt", Value::from("x")).await.unwrap();

        let conn = driver.conn.lock();
        let kinds: Vec<String> = conn
            .prepare("SELECT typeof(value) FROM store_keyvaluepairs ORDER BY id")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<rusqlite::Result<_>>()
            .unwrap();
        assert_eq!(kinds, vec!["blob", "text"]);
    }

    #[tokio::test]
    async fn test_key_by_index_follows_insertion() {
        let tmp = TempDir::new().unwrap();
        let driver = SqliteDriver::open(&config(&tmp)).unwrap();
        driver.set_item("z", Value::from(1)).await.unwrap();
        driver.set_item("a", Value::from(2)).await.unwrap();
        driver.set_item("z", Value::from(3)).await.unwrap();

        assert_eq!(driver.key(0).await.unwrap().as_deref(), Some("z"));
        assert_eq!(driver.key(1).await.unwrap().as_deref(), Some("a"));
        assert_eq!(driver.key(2).await.unwrap(), None);
        assert_eq!(driver.key(u64::MAX).await.unwrap(), None);
    }

    #[test]
    fn test_user_version_written() {
        let tmp = TempDir::new().unwrap();
        let driver = SqliteDriver::open(&config(&tmp).with_version(7)).unwrap();
        let version: i64 = driver
            .conn
            .lock()
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 7);
    }

    #[test]
    fn test_foreign_storage_class_rejected() {
        assert!(matches!(decode(SqlValue::Integer(1)), Err(Error::Serialization(_))));
    }

    #[test]
    fn test_busy_maps_to_connection_blocked() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert_eq!(
            backend_err("write", err).backend_kind(),
            Some(BackendErrorKind::ConnectionBlocked)
        );
    }
}
