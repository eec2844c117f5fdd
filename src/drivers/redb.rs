//! Redb-backed storage driver.
//!
//! Each database name maps to one redb file; each store is a table in it.
//! Records are an 8-byte big-endian insertion sequence followed by the
//! serializer's binary form, so iteration can follow insertion order while
//! redb keeps the table sorted by key. Every operation runs in exactly one
//! redb transaction.

use async_trait::async_trait;
use redb::{
    Builder, Database, ReadOnlyTable, ReadTransaction, ReadableDatabase, ReadableTable,
    ReadableTableMetadata, TableDefinition, TableError,
};
use std::sync::{Arc, LazyLock};

use super::Driver;
use super::shared::{HandleCache, prepare_dir};
use crate::config::StoreConfig;
use crate::error::{BackendErrorKind, Error, Result};
use crate::paths;
use crate::retry::{RetryConfig, retry_blocking};
use crate::serializer;
use crate::value::Value;

pub(crate) const NAME: &str = "redb";

/// Per-database metadata: schema version and per-store sequence counters.
const META_TABLE: TableDefinition<'static, &'static str, u64> =
    TableDefinition::new("__unikv_meta");
const VERSION_KEY: &str = "version";

/// Length of the sequence prefix on every record.
const SEQ_LEN: usize = 8;

static DATABASES: LazyLock<HandleCache<Database>> = LazyLock::new(HandleCache::new);

type StoreTable = ReadOnlyTable<&'static str, &'static [u8]>;

/// Redb storage driver bound to one store.
///
/// `RedbDriver` is `Clone`; clones share the database handle. Stores with
/// the same data directory and database name share one open database.
#[derive(Clone)]
pub struct RedbDriver {
    db: Arc<Database>,
    table: Arc<str>,
    seq_key: Arc<str>,
}

impl RedbDriver {
    /// Opens (or creates) the database for `config` and prepares the
    /// store's table.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The data directory cannot be created
    /// - The database file cannot be opened (permissions, held by another process)
    /// - The initialization transaction fails
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let dir = prepare_dir(NAME, &config.resolved_data_dir())?;
        let path = paths::redb_path(&dir, &config.name);

        // A store dropped moments ago may still be closing this file.
        let db = retry_blocking(&RetryConfig::handle_release(), "open redb database", || {
            DATABASES.get_or_try_open(&path, || {
                let mut builder = Builder::new();
                if let Ok(cache) = usize::try_from(config.size)
                    && cache > 0
                {
                    builder.set_cache_size(cache);
                }
                builder
                    .create(&path)
                    .map_err(|e| backend_err(&format!("open {}", path.display()), e))
            })
        })?;

        let driver = Self {
            db,
            table: Arc::from(format!("store:{}", config.store_name)),
            seq_key: Arc::from(format!("seq:{}", config.store_name)),
        };
        driver.init(config.version)?;

        tracing::debug!(path = %path.display(), table = %driver.table, "Opened redb store");
        Ok(driver)
    }

    /// Probe: the data directory must accept new files.
    pub fn probe(config: &StoreConfig) -> bool {
        paths::is_writable_dir(&config.resolved_data_dir())
    }

    fn table_def(&self) -> TableDefinition<'_, &'static str, &'static [u8]> {
        TableDefinition::new(&self.table)
    }

    /// Creates the tables and records the schema version.
    fn init(&self, version: u32) -> Result<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| txn_err("begin init transaction", e))?;
        {
            let mut meta = txn
                .open_table(META_TABLE)
                .map_err(|e| backend_err("open metadata table", e))?;
            let stored = meta
                .get(VERSION_KEY)
                .map_err(|e| backend_err("read version", e))?
                .map(|g| g.value());

            match stored {
                Some(v) if v > u64::from(version) => {
                    tracing::warn!(
                        stored = v,
                        requested = version,
                        "Database has a newer schema version than requested"
                    );
                },
                Some(v) if v == u64::from(version) => {},
                _ => {
                    meta.insert(VERSION_KEY, u64::from(version))
                        .map_err(|e| backend_err("write version", e))?;
                },
            }

            txn.open_table(self.table_def())
                .map_err(|e| backend_err("create store table", e))?;
        }
        txn.commit().map_err(|e| txn_err("commit init transaction", e))
    }

    fn begin_read(&self) -> Result<ReadTransaction> {
        self.db
            .begin_read()
            .map_err(|e| txn_err("begin read transaction", e))
    }

    /// Opens the store table for reading; `None` if it was dropped.
    fn open_read(&self, txn: &ReadTransaction) -> Result<Option<StoreTable>> {
        match txn.open_table(self.table_def()) {
            Ok(table) => Ok(Some(table)),
            Err(TableError::TableDoesNotExist(_)) => Ok(None),
            Err(e) => Err(backend_err("open store table", e)),
        }
    }

    fn get_sync(&self, key: &str) -> Result<Option<Value>> {
        let txn = self.begin_read()?;
        let Some(table) = self.open_read(&txn)? else {
            return Ok(None);
        };

        let record = table
            .get(key)
            .map_err(|e| backend_err(&format!("read key '{key}'"), e))?;

        record.map(|guard| decode_record(guard.value())).transpose()
    }

    fn set_sync(&self, key: &str, value: Value) -> Result<Value> {
        let encoded = serializer::to_bytes(&value)?;

        let txn = self
            .db
            .begin_write()
            .map_err(|e| txn_err("begin write transaction", e))?;
        {
            let mut table = txn
                .open_table(self.table_def())
                .map_err(|e| backend_err("open store table", e))?;

            let existing_seq = table
                .get(key)
                .map_err(|e| backend_err(&format!("read key '{key}'"), e))?
                .map(|guard| record_seq(guard.value()))
                .transpose()?;

            let seq = match existing_seq {
                Some(seq) => seq,
                None => self.next_seq(&txn)?,
            };

            let mut record = Vec::with_capacity(SEQ_LEN + encoded.len());
            record.extend_from_slice(&seq.to_be_bytes());
            record.extend_from_slice(&encoded);

            table
                .insert(key, record.as_slice())
                .map_err(|e| backend_err(&format!("insert key '{key}'"), e))?;
        }
        txn.commit().map_err(|e| txn_err("commit set transaction", e))?;

        Ok(value)
    }

    /// Allocates the next insertion sequence number for this store.
    fn next_seq(&self, txn: &redb::WriteTransaction) -> Result<u64> {
        let mut meta = txn
            .open_table(META_TABLE)
            .map_err(|e| backend_err("open metadata table", e))?;
        let seq = meta
            .get(&*self.seq_key)
            .map_err(|e| backend_err("read sequence", e))?
            .map_or(0, |g| g.value());
        meta.insert(&*self.seq_key, seq + 1)
            .map_err(|e| backend_err("write sequence", e))?;
        Ok(seq)
    }

    fn remove_sync(&self, key: &str) -> Result<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| txn_err("begin write transaction", e))?;
        {
            let mut table = txn
                .open_table(self.table_def())
                .map_err(|e| backend_err("open store table", e))?;
            table
                .remove(key)
                .map_err(|e| backend_err(&format!("remove key '{key}'"), e))?;
        }
        txn.commit().map_err(|e| txn_err("commit remove transaction", e))
    }

    /// Deletes the store table; recreates it empty unless `drop` is set.
    fn reset_sync(&self, drop: bool) -> Result<()> {
        let txn = self
            .db
            .begin_write()
            .map_err(|e| txn_err("begin write transaction", e))?;
        txn.delete_table(self.table_def())
            .map_err(|e| backend_err("delete store table", e))?;
        if drop {
            let mut meta = txn
                .open_table(META_TABLE)
                .map_err(|e| backend_err("open metadata table", e))?;
            meta.remove(&*self.seq_key)
                .map_err(|e| backend_err("remove sequence", e))?;
        } else {
            txn.open_table(self.table_def())
                .map_err(|e| backend_err("create store table", e))?;
        }
        txn.commit().map_err(|e| txn_err("commit clear transaction", e))
    }

    fn length_sync(&self) -> Result<u64> {
        let txn = self.begin_read()?;
        match self.open_read(&txn)? {
            Some(table) => table.len().map_err(|e| backend_err("count entries", e)),
            None => Ok(0),
        }
    }

    /// Scans the table, returning `(seq, key, record)` sorted by sequence.
    fn scan_sync<T>(&self, mut map: impl FnMut(&[u8]) -> Result<T>) -> Result<Vec<(String, T)>> {
        let txn = self.begin_read()?;
        let Some(table) = self.open_read(&txn)? else {
            return Ok(Vec::new());
        };

        let mut rows = Vec::new();
        for item in table.iter().map_err(|e| backend_err("iterate store table", e))? {
            let (key, record) = item.map_err(|e| backend_err("read entry", e))?;
            let record = record.value();
            let seq = record_seq(record)?;
            rows.push((seq, key.value().to_string(), map(record)?));
        }

        rows.sort_by_key(|(seq, _, _)| *seq);
        Ok(rows.into_iter().map(|(_, key, v)| (key, v)).collect())
    }

    fn keys_sync(&self) -> Result<Vec<String>> {
        Ok(self
            .scan_sync(|_| Ok(()))?
            .into_iter()
            .map(|(key, ())| key)
            .collect())
    }

    fn entries_sync(&self) -> Result<Vec<(String, Value)>> {
        self.scan_sync(decode_record)
    }
}

fn record_seq(record: &[u8]) -> Result<u64> {
    let prefix: [u8; SEQ_LEN] = record
        .get(..SEQ_LEN)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::serialization("redb record shorter than its sequence prefix"))?;
    Ok(u64::from_be_bytes(prefix))
}

fn decode_record(record: &[u8]) -> Result<Value> {
    record_seq(record)?;
    serializer::from_bytes(&record[SEQ_LEN..])
}

/// Maps a redb failure into the shared taxonomy.
fn backend_err(op: &str, err: impl Into<redb::Error>) -> Error {
    let err: redb::Error = err.into();
    let kind = match &err {
        redb::Error::DatabaseAlreadyOpen => BackendErrorKind::ConnectionBlocked,
        redb::Error::Io(_) => BackendErrorKind::Io,
        _ => BackendErrorKind::Other,
    };
    Error::backend(NAME, kind, format!("{op}: {err}"))
}

fn txn_err(op: &str, err: impl std::fmt::Display) -> Error {
    Error::backend(NAME, BackendErrorKind::TransactionAborted, format!("{op}: {err}"))
}

#[async_trait]
impl Driver for RedbDriver {
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
        tokio::task::spawn_blocking(move || driver.reset_sync(false)).await?
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
        tokio::task::spawn_blocking(move || driver.reset_sync(true)).await?
    }

    async fn length(&self) -> Result<u64> {
        let driver = self.clone();
        tokio::task::spawn_blocking(move || driver.length_sync()).await?
    }
}
