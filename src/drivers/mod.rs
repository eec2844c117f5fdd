//! Storage drivers with a uniform async capability set.
//!
//! Three drivers ship with the crate, in default preference order:
//!
//! - **RedbDriver** (`redb`): embedded transactional KV database, one file
//!   per database name, one table per store
//! - **SqliteDriver** (`sqlite`): embedded SQLite, one table per store
//! - **LocalStorageDriver** (`localstorage`): synchronous string map kept in
//!   one JSON file per data directory; the guaranteed fallback
//!
//! Drivers are chosen by the [`selector`] from an immutable
//! [`DriverRegistry`]. Custom drivers implement [`Driver`] and are added
//! through [`DriverRegistry::builder`].
//!
//! # Example
//!
//! ```ignore
//! use unikv::drivers::{Driver, DriverDescriptor, DriverRegistry};
//!
//! struct RemoteDriver { /* ... */ }
//! impl Driver for RemoteDriver { /* ... */ }
//!
//! let registry = DriverRegistry::builder()
//!     .with_builtin()
//!     .register(DriverDescriptor::new("remote", 10, |_| true, |cfg| RemoteDriver::open(cfg)))
//!     .build()?;
//! ```

mod localstorage;
mod redb;
mod registry;
pub mod selector;
mod shared;
mod sqlite;


use async_trait::async_trait;

use crate::error::Result;
use crate::value::Value;

pub use localstorage::LocalStorageDriver;
pub use redb::RedbDriver;
pub use registry::{DriverDescriptor, DriverRegistry, DriverRegistryBuilder, OpenFn, ProbeFn};
pub use sqlite::SqliteDriver;

/// Name of the redb driver.
pub const REDB: &str = redb::NAME;
/// Name of the SQLite driver.
pub const SQLITE: &str = sqlite::NAME;
/// Name of the local-storage driver.
pub const LOCAL_STORAGE: &str = localstorage::NAME;

/// Capability set every storage driver provides.
///
/// A driver instance is bound to one store namespace when it is opened and
/// never sees entries of other namespaces, even when they share a backend
/// file. All methods must avoid blocking the async runtime; the built-in
/// drivers run backend work on tokio's blocking pool.
///
/// Keys reaching a driver have already passed
/// [`serializer::check_key`](crate::serializer::check_key).
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Registry name of this driver.
    fn name(&self) -> &'static str;

    /// Retrieves a value by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails or the stored value
    /// cannot be decoded.
    async fn get_item(&self, key: &str) -> Result<Option<Value>>;

    /// Stores a value, overwriting any existing entry for `key`.
    ///
    /// An overwritten key keeps its position in iteration order.
    /// Returns the stored value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be encoded or the write fails.
    async fn set_item(&self, key: &str, value: Value) -> Result<Value>;

    /// Removes an entry. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    async fn remove_item(&self, key: &str) -> Result<()>;

    /// Removes every entry of this namespace and nothing else.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    async fn clear(&self) -> Result<()>;

    /// Lists keys in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Lists entries in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails or a value cannot be decoded.
    async fn entries(&self) -> Result<Vec<(String, Value)>>;

    /// Removes the namespace's backing table or prefix entirely.
    ///
    /// The driver stays usable and recreates its namespace on next write.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    async fn drop_store(&self) -> Result<()>;

    /// Number of entries.
    ///
    /// Default implementation counts [`keys`](Driver::keys); backends may
    /// override for efficiency.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn length(&self) -> Result<u64> {
        Ok(self.keys().await?.len() as u64)
    }

    /// Key at `index` in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    async fn key(&self, index: u64) -> Result<Option<String>> {
        let keys = self.keys().await?;
        Ok(usize::try_from(index)
            .ok()
            .and_then(|i| keys.into_iter().nth(i)))
    }
}
