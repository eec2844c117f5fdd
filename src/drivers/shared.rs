//! Process-wide table of open backend handles.
//!
//! Some backends may only be opened once per process (redb locks its file),
//! and the local-storage area must be one in-memory map per file so that
//! stores sharing it see each other's writes to the file. Handles are held
//! weakly: the backend closes once the last driver using it is dropped.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use crate::error::{BackendErrorKind, Error, Result};

pub(crate) struct HandleCache<T> {
    handles: DashMap<PathBuf, Weak<T>>,
}

impl<T> HandleCache<T> {
    pub(crate) fn new() -> Self {
        Self {
            handles: DashMap::new(),
        }
    }

    /// Returns the live handle for `path`, opening it if none exists.
    ///
    /// The map shard stays locked while `open` runs, so two stores racing
    /// to open the same file end up with the same handle.
    pub(crate) fn get_or_try_open<F>(&self, path: &Path, open: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<T>,
    {
        self.prune();

        let mut slot = self
            .handles
            .entry(path.to_path_buf())
            .or_insert_with(Weak::new);

        if let Some(handle) = slot.upgrade() {
            return Ok(handle);
        }

        match open() {
            Ok(handle) => {
                let handle = Arc::new(handle);
                *slot = Arc::downgrade(&handle);
                Ok(handle)
            },
            Err(err) => {
                drop(slot);
                self.handles
                    .remove_if(path, |_, handle| handle.strong_count() == 0);
                Err(err)
            },
        }
    }

    /// Forgets entries whose backend has already closed.
    fn prune(&self) {
        self.handles.retain(|_, handle| handle.strong_count() > 0);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.handles.len()
    }
}

/// Creates `dir` and returns its canonical form, so that different
/// spellings of one directory map to the same cached handle.
pub(crate) fn prepare_dir(driver: &'static str, dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| {
        Error::backend(
            driver,
            BackendErrorKind::Io,
            format!("failed to create data directory {}: {e}", dir.display()),
        )
    })?;
    dir.canonicalize().map_err(|e| {
        Error::backend(
            driver,
            BackendErrorKind::Io,
            format!("failed to resolve data directory {}: {e}", dir.display()),
        )
    })
}
