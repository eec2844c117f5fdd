//! Local-storage driver: the guaranteed fallback.
//!
//! Mirrors a browser's `localStorage`: one synchronous string-to-string
//! area per data directory, shared by every store, persisted as a single
//! JSON file. Stores are separated by a `<name>/<store_name>/` key prefix
//! whose components are escaped so they never contain `/`. Values use the
//! serializer's text form, and the whole area is subject to a byte quota.
//!
//! Writes are atomic per entry only: a mutation is applied to a copy of the
//! area, the copy is written to a temporary file and renamed over the old
//! file, and only then does it replace the in-memory area.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use super::Driver;
use super::shared::{HandleCache, prepare_dir};
use crate::config::StoreConfig;
use crate::error::{BackendErrorKind, Error, Result};
use crate::paths;
use crate::serializer;
use crate::value::Value;

pub(crate) const NAME: &str = "localstorage";

/// On-disk format version of the area file.
const FILE_VERSION: u32 = 1;

static AREAS: LazyLock<HandleCache<Area>> = LazyLock::new(HandleCache::new);

#[derive(Serialize, Deserialize)]
struct AreaFile {
    version: u32,
    entries: Vec<(String, String)>,
}

/// Ordered string map with O(1) lookup.
#[derive(Clone, Default)]
struct AreaState {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
    used_bytes: u64,
}

impl AreaState {
    fn from_entries(entries: Vec<(String, String)>) -> Self {
        let mut state = Self::default();
        for (key, value) in entries {
            state.insert(key, value);
        }
        state
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.index.get(key).map(|&i| self.entries[i].1.as_str())
    }

    fn insert(&mut self, key: String, value: String) {
        if let Some(&i) = self.index.get(&key) {
            let old = std::mem::replace(&mut self.entries[i].1, value);
            self.used_bytes = self.used_bytes - old.len() as u64 + self.entries[i].1.len() as u64;
        } else {
            self.used_bytes += (key.len() + value.len()) as u64;
            self.index.insert(key.clone(), self.entries.len());
            self.entries.push((key, value));
        }
    }

    /// Removes one key, keeping the order of the rest.
    fn remove(&mut self, key: &str) -> bool {
        let Some(i) = self.index.remove(key) else {
            return false;
        };
        let (k, v) = self.entries.remove(i);
        self.used_bytes -= (k.len() + v.len()) as u64;
        for (j, (k, _)) in self.entries.iter().enumerate().skip(i) {
            if let Some(slot) = self.index.get_mut(k) {
                *slot = j;
            }
        }
        true
    }

    /// Removes every key for which `remove` returns true.
    fn remove_where(&mut self, mut remove: impl FnMut(&str) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| !remove(k));
        if self.entries.len() != before {
            self.index = self
                .entries
                .iter()
                .enumerate()
                .map(|(i, (k, _))| (k.clone(), i))
                .collect();
            self.used_bytes = self
                .entries
                .iter()
                .map(|(k, v)| (k.len() + v.len()) as u64)
                .sum();
        }
        before - self.entries.len()
    }
}

/// One shared local-storage file and its in-memory contents.
struct Area {
    path: PathBuf,
    state: Mutex<AreaState>,
}

impl Area {
    fn load(path: &Path) -> Result<Self> {
        let state = match std::fs::read(path) {
            Ok(bytes) => {
                let file: AreaFile = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::backend(
                        NAME,
                        BackendErrorKind::Other,
                        format!("corrupt local storage file {}: {e}", path.display()),
                    )
                })?;
                if file.version != FILE_VERSION {
                    return Err(Error::backend(
                        NAME,
                        BackendErrorKind::Other,
                        format!("unsupported local storage file version {}", file.version),
                    ));
                }
                AreaState::from_entries(file.entries)
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AreaState::default(),
            Err(e) => {
                return Err(io_err(&format!("read {}", path.display()), &e));
            },
        };

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(state),
        })
    }

    /// Applies `mutate` to a copy of the area, persists it, then publishes it.
    fn update<T>(&self, mutate: impl FnOnce(&mut AreaState) -> Result<T>) -> Result<T> {
        let mut state = self.state.lock();
        let mut next = state.clone();
        let out = mutate(&mut next)?;
        self.persist(&next)?;
        *state = next;
        Ok(out)
    }

    fn read<T>(&self, f: impl FnOnce(&AreaState) -> T) -> T {
        f(&self.state.lock())
    }

    fn persist(&self, state: &AreaState) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let file = AreaFile {
            version: FILE_VERSION,
            entries: state.entries.clone(),
        };
        let json = serde_json::to_vec(&file)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| io_err("create temporary file", &e))?;
        tmp.write_all(&json)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| io_err("write temporary file", &e))?;
        tmp.persist(&self.path)
            .map_err(|e| io_err(&format!("replace {}", self.path.display()), &e.error))?;
        Ok(())
    }
}

fn io_err(op: &str, err: &std::io::Error) -> Error {
    let kind = if err.kind() == std::io::ErrorKind::StorageFull {
        BackendErrorKind::QuotaExceeded
    } else {
        BackendErrorKind::Io
    };
    Error::backend(NAME, kind, format!("{op}: {err}"))
}

/// Local-storage driver bound to one store's key prefix.
#[derive(Clone)]
pub struct LocalStorageDriver {
    area: Arc<Area>,
    prefix: Arc<str>,
    quota: u64,
}

impl LocalStorageDriver {
    /// Opens the shared area of the configured data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be created or the area
    /// file exists but cannot be read or parsed.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let dir = prepare_dir(NAME, &config.resolved_data_dir())?;
        let path = paths::local_storage_path(&dir);
        let area = AREAS.get_or_try_open(&path, || Area::load(&path))?;

        let prefix = format!(
            "{}/{}/",
            paths::escape_name(&config.name),
            paths::escape_name(&config.store_name)
        );
        tracing::debug!(path = %path.display(), prefix = %prefix, "Opened local storage area");

        Ok(Self {
            area,
            prefix: Arc::from(prefix),
            quota: config.local_quota_bytes,
        })
    }

    /// Probe: the area file must be writable.
    pub fn probe(config: &StoreConfig) -> bool {
        paths::is_writable_dir(&config.resolved_data_dir())
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn get_sync(&self, key: &str) -> Result<Option<Value>> {
        let full = self.full_key(key);
        let text = self.area.read(|s| s.get(&full).map(str::to_string));
        text.map(|t| serializer::from_text(&t)).transpose()
    }

    fn set_sync(&self, key: &str, value: Value) -> Result<Value> {
        let text = serializer::to_text(&value)?;
        let full = self.full_key(key);
        let quota = self.quota;

        self.area.update(|state| {
            state.insert(full, text);
            if state.used_bytes > quota {
                return Err(Error::backend(
                    NAME,
                    BackendErrorKind::QuotaExceeded,
                    format!(
                        "storing '{key}' needs {} bytes, quota is {quota}",
                        state.used_bytes
                    ),
                ));
            }
            Ok(())
        })?;
        Ok(value)
    }

    fn remove_sync(&self, key: &str) -> Result<()> {
        let full = self.full_key(key);
        if self.area.read(|s| s.get(&full).is_none()) {
            return Ok(());
        }
        self.area.update(|state| {
            state.remove(&full);
            Ok(())
        })
    }

    fn clear_sync(&self) -> Result<()> {
        let prefix = &*self.prefix;
        if self.area.read(|s| !s.entries.iter().any(|(k, _)| k.starts_with(prefix))) {
            return Ok(());
        }
        let removed = self.area.update(|state| Ok(state.remove_where(|k| k.starts_with(prefix))))?;
        tracing::debug!(prefix, removed, "Cleared local storage prefix");
        Ok(())
    }

    fn keys_sync(&self) -> Vec<String> {
        let prefix = &*self.prefix;
        self.area.read(|s| {
            s.entries
                .iter()
                .filter_map(|(k, _)| k.strip_prefix(prefix).map(str::to_string))
                .collect()
        })
    }

    fn entries_sync(&self) -> Result<Vec<(String, Value)>> {
        let prefix = &*self.prefix;
        let raw: Vec<(String, String)> = self.area.read(|s| {
            s.entries
                .iter()
                .filter_map(|(k, v)| k.strip_prefix(prefix).map(|k| (k.to_string(), v.clone())))
                .collect()
        });
        raw.into_iter()
            .map(|(k, v)| Ok((k, serializer::from_text(&v)?)))
            .collect()
    }
}

#[async_trait]
impl Driver for LocalStorageDriver {
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
        Ok(tokio::task::spawn_blocking(move || driver.keys_sync()).await?)
    }

    async fn entries(&self) -> Result<Vec<(String, Value)>> {
        let driver = self.clone();
        tokio::task::spawn_blocking(move || driver.entries_sync()).await?
    }

    async fn drop_store(&self) -> Result<()> {
        self.clear().await
    }
}
