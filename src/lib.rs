//! unikv - one asynchronous key-value API over several storage backends.
//!
//! A [`Store`] picks the best available driver at first use (redb, then
//! SQLite, then a JSON local-storage file) and exposes the same
//! operations whatever the backend: `get_item`, `set_item`, `remove_item`,
//! `clear`, `length`, `key`, `keys`, `iterate` and `drop_instance`.
//!
//! Values are [`Value`]s: JSON-like data plus binary blobs. Each driver
//! persists them through the [`serializer`] so that every kind round-trips
//! on every backend.
//!
//! ```ignore
//! use unikv::{Store, StoreConfig, Value};
//!
//! #[tokio::main]
//! async fn main() -> unikv::Result<()> {
//!     let store = Store::new(StoreConfig::new("app"))?;
//!     store.set_item("avatar", Value::Blob(vec![0x89, 0x50, 0x4e, 0x47]));
//!     println!("driver: {}", store.ready().await?);
//!     println!("{:?}", store.get_item("avatar").await?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod deferred;
pub mod drivers;
pub mod error;
pub mod paths;
mod retry;
pub mod serializer;
pub mod store;
pub mod value;

pub use config::{StoreConfig, ValidationResult};
pub use deferred::Deferred;
pub use error::{BackendErrorKind, Error, Result};
pub use store::Store;
pub use value::Value;
