//! The unified store facade.
//!
//! A [`Store`] is one `(name, store_name)` namespace backed by whichever
//! driver the selector picks. Every operation returns a [`Deferred`]
//! immediately and is queued on the store's worker; results arrive in
//! issue order.
//!
//! ```ignore
//! let store = Store::new(StoreConfig::new("app"))?;
//! store.set_item("greeting", "hello");
//! let value = store.get_item("greeting").await?;
//!
//! store.length().on_complete(|n| println!("{n:?} entries"));
//! ```

mod worker;


use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use std::fmt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::config::StoreConfig;
use crate::deferred::Deferred;
use crate::drivers::{Driver, DriverRegistry};
use crate::error::{Error, Result};
use crate::serializer;
use crate::value::Value;
use worker::{Job, Message, Worker};

/// State readable without going through the worker.
struct Shared {
    config: RwLock<StoreConfig>,
    driver: RwLock<Option<String>>,
}

struct Inner {
    tx: mpsc::UnboundedSender<Message>,
    shared: Arc<Shared>,
    registry: Arc<DriverRegistry>,
    handle: Handle,
}

/// Handle to one store namespace. Cheap to clone; clones share the worker.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

impl Store {
    /// Creates a store over the built-in drivers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the config is invalid or no tokio
    /// runtime is running.
    pub fn new(config: StoreConfig) -> Result<Self> {
        Self::with_registry(config, DriverRegistry::builtin())
    }

    /// Creates a store that selects from a custom registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the config is invalid, names a driver
    /// missing from `registry`, or no tokio runtime is running.
    pub fn with_registry(config: StoreConfig, registry: Arc<DriverRegistry>) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|_| Error::config("a store must be created inside a tokio runtime"))?;
        let config = prepare_config(&config, &registry)?;

        tracing::debug!(
            name = %config.name,
            store = %config.store_name,
            data_dir = %config.resolved_data_dir().display(),
            "Creating store"
        );

        let shared = Arc::new(Shared {
            config: RwLock::new(config),
            driver: RwLock::new(None),
        });
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(Worker::new(registry.clone(), shared.clone(), rx).run());

        Ok(Self {
            inner: Arc::new(Inner {
                tx,
                shared,
                registry,
                handle,
            }),
        })
    }

    /// Reads a value. Resolves to `None` if the key is absent.
    pub fn get_item(&self, key: impl Into<String>) -> Deferred<Option<Value>> {
        let key = key.into();
        if let Err(e) = serializer::check_key(&key) {
            return self.fail(e);
        }
        self.run(move |driver| async move { driver.get_item(&key).await })
    }

    /// Stores a value and resolves to it.
    pub fn set_item(&self, key: impl Into<String>, value: impl Into<Value>) -> Deferred<Value> {
        let key = key.into();
        if let Err(e) = serializer::check_key(&key) {
            return self.fail(e);
        }
        let value = value.into();
        self.run(move |driver| async move { driver.set_item(&key, value).await })
    }

    /// Removes a key. Removing an absent key succeeds.
    pub fn remove_item(&self, key: impl Into<String>) -> Deferred<()> {
        let key = key.into();
        if let Err(e) = serializer::check_key(&key) {
            return self.fail(e);
        }
        self.run(move |driver| async move { driver.remove_item(&key).await })
    }

    /// Removes every entry of this store, leaving other stores untouched.
    pub fn clear(&self) -> Deferred<()> {
        self.run(|driver| async move { driver.clear().await })
    }

    /// Number of entries.
    pub fn length(&self) -> Deferred<u64> {
        self.run(|driver| async move { driver.length().await })
    }

    /// Key at `index` in insertion order, or `None` past the end.
    pub fn key(&self, index: u64) -> Deferred<Option<String>> {
        self.run(move |driver| async move { driver.key(index).await })
    }

    /// All keys in insertion order.
    pub fn keys(&self) -> Deferred<Vec<String>> {
        self.run(|driver| async move { driver.keys().await })
    }

    /// Visits entries in insertion order.
    ///
    /// The visitor gets `(key, value, n)` where `n` counts from 1. Returning
    /// `Some` stops the walk and becomes the result.
    pub fn iterate<T, F>(&self, mut visitor: F) -> Deferred<Option<T>>
    where
        T: Send + 'static,
        F: FnMut(String, Value, u64) -> Option<T> + Send + 'static,
    {
        self.run(move |driver| async move {
            for (n, (key, value)) in (1..).zip(driver.entries().await?) {
                if let Some(out) = visitor(key, value, n) {
                    return Ok(Some(out));
                }
            }
            Ok(None)
        })
    }

    /// Restricts selection to `names`, in order. No fallback happens: if
    /// none of them is usable the store fails with
    /// [`Error::DriverUnavailable`].
    ///
    /// Once a driver is active this only succeeds if `names` contains it.
    pub fn set_driver<I, S>(&self, names: I) -> Deferred<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return self.fail(Error::config("set_driver needs at least one driver name"));
        }
        let (reply, deferred) = Deferred::pair(self.inner.handle.clone());
        self.send(Message::SetDriver { names, reply });
        deferred
    }

    /// Forces driver selection and resolves to the active driver's name.
    pub fn ready(&self) -> Deferred<String> {
        let (reply, deferred) = Deferred::pair(self.inner.handle.clone());
        self.send(Message::Ready { reply });
        deferred
    }

    /// Name of the active driver, if one has been selected.
    #[must_use]
    pub fn driver(&self) -> Option<String> {
        self.inner.shared.driver.read().clone()
    }

    /// Whether the named driver is registered and its probe passes for
    /// this store's config.
    #[must_use]
    pub fn supports(&self, name: &str) -> bool {
        let config = self.config();
        self.inner
            .registry
            .get(name)
            .is_some_and(|d| d.probe(&config))
    }

    /// Current config.
    #[must_use]
    pub fn config(&self) -> StoreConfig {
        self.inner.shared.config.read().clone()
    }

    /// Replaces the store's options. Fails with [`Error::Config`] once any
    /// operation has selected a driver.
    pub fn configure(&self, config: StoreConfig) -> Deferred<()> {
        let (reply, deferred) = Deferred::pair(self.inner.handle.clone());
        self.send(Message::Configure { config, reply });
        deferred
    }

    /// Drops this store's namespace in the backend.
    pub fn drop_instance(&self) -> Deferred<()> {
        self.run(|driver| async move { driver.drop_store().await })
    }

    /// Queues a driver operation.
    fn run<T, F, Fut>(&self, op: F) -> Deferred<T>
    where
        T: Send + 'static,
        F: FnOnce(Arc<dyn Driver>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (completer, deferred) = Deferred::pair(self.inner.handle.clone());
        let job: Job = Box::new(move |driver: Result<Arc<dyn Driver>>| -> BoxFuture<'static, ()> {
            Box::pin(async move {
                let result = match driver {
                    Ok(driver) => AssertUnwindSafe(async move { op(driver).await })
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|payload| Err(panicked(payload.as_ref()))),
                    Err(e) => Err(e),
                };
                completer.complete(result);
            })
        });
        self.send(Message::Op(job));
        deferred
    }

    fn send(&self, message: Message) {
        // A send only fails once the runtime has shut the worker down; the
        // dropped completer then resolves the deferred with `Error::Closed`.
        let _ = self.inner.tx.send(message);
    }

    fn fail<T>(&self, err: Error) -> Deferred<T> {
        Deferred::resolved(self.inner.handle.clone(), Err(err))
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.inner.shared.config.read();
        f.debug_struct("Store")
            .field("name", &config.name)
            .field("store_name", &config.store_name)
            .field("driver", &*self.inner.shared.driver.read())
            .finish_non_exhaustive()
    }
}

/// Turns a caught panic into an error for the one operation that raised it.
fn panicked(payload: &(dyn Any + Send)) -> Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(panic = %message, "Store operation panicked");
    Error::Panicked(message)
}

/// Validates a config against a registry.
fn prepare_config(config: &StoreConfig, registry: &DriverRegistry) -> Result<StoreConfig> {
    let validation = config.validate()?;
    for warning in &validation.warnings {
        tracing::warn!(name = %config.name, "{warning}");
    }

    if let Some(unknown) = config
        .driver_order
        .iter()
        .find(|name| registry.get(name).is_none())
    {
        return Err(Error::config(format!(
            "driver_order names unknown driver '{unknown}' (known: {})",
            registry.names().join(", ")
        )));
    }

    Ok(config.clone())
}
