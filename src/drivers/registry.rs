//! Immutable, ordered list of driver descriptors.
//!
//! A [`DriverRegistry`] is built once (built-in drivers plus any custom
//! ones) and then only read. Stores hold it behind an `Arc`; nothing can
//! add or remove drivers from a registry that is in use.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use super::{Driver, LocalStorageDriver, RedbDriver, SqliteDriver};
use crate::config::StoreConfig;
use crate::error::{Error, Result};

/// Capability probe: reports whether a driver can run with this config.
pub type ProbeFn = Arc<dyn Fn(&StoreConfig) -> bool + Send + Sync>;
/// Opens a driver instance bound to the config's namespace.
pub type OpenFn = Arc<dyn Fn(&StoreConfig) -> Result<Arc<dyn Driver>> + Send + Sync>;

/// Static metadata for one driver.
#[derive(Clone)]
pub struct DriverDescriptor {
    name: String,
    rank: u32,
    probe: ProbeFn,
    open: OpenFn,
}

impl DriverDescriptor {
    /// Creates a descriptor. Lower `rank` is preferred.
    pub fn new<P, O>(name: impl Into<String>, rank: u32, probe: P, open: O) -> Self
    where
        P: Fn(&StoreConfig) -> bool + Send + Sync + 'static,
        O: Fn(&StoreConfig) -> Result<Arc<dyn Driver>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            rank,
            probe: Arc::new(probe),
            open: Arc::new(open),
        }
    }

    /// Returns a copy with a different probe. Useful to simulate
    /// environments where a backend is missing.
    #[must_use]
    pub fn with_probe<P>(mut self, probe: P) -> Self
    where
        P: Fn(&StoreConfig) -> bool + Send + Sync + 'static,
    {
        self.probe = Arc::new(probe);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// Runs the capability probe.
    pub fn probe(&self, config: &StoreConfig) -> bool {
        (self.probe)(config)
    }

    /// Opens a driver instance.
    ///
    /// # Errors
    ///
    /// Returns whatever error the driver's open function reports.
    pub fn open(&self, config: &StoreConfig) -> Result<Arc<dyn Driver>> {
        (self.open)(config)
    }

    /// The redb driver descriptor (rank 0).
    pub fn redb() -> Self {
        Self::new(super::REDB, 0, RedbDriver::probe, |cfg| {
            Ok(Arc::new(RedbDriver::open(cfg)?) as Arc<dyn Driver>)
        })
    }

    /// The SQLite driver descriptor (rank 1).
    pub fn sqlite() -> Self {
        Self::new(super::SQLITE, 1, SqliteDriver::probe, |cfg| {
            Ok(Arc::new(SqliteDriver::open(cfg)?) as Arc<dyn Driver>)
        })
    }

    /// The local-storage driver descriptor (rank 2).
    pub fn local_storage() -> Self {
        Self::new(super::LOCAL_STORAGE, 2, LocalStorageDriver::probe, |cfg| {
            Ok(Arc::new(LocalStorageDriver::open(cfg)?) as Arc<dyn Driver>)
        })
    }
}

impl fmt::Debug for DriverDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverDescriptor")
            .field("name", &self.name)
            .field("rank", &self.rank)
            .finish_non_exhaustive()
    }
}

/// Ordered driver descriptors, sorted by rank.
#[derive(Debug)]
pub struct DriverRegistry {
    descriptors: Vec<DriverDescriptor>,
}

impl DriverRegistry {
    /// The built-in registry: redb, sqlite, localstorage.
    pub fn builtin() -> Arc<Self> {
        Arc::new(Self {
            descriptors: builtin_descriptors(),
        })
    }

    /// Starts an empty registry builder.
    pub fn builder() -> DriverRegistryBuilder {
        DriverRegistryBuilder::default()
    }

    /// Looks up a descriptor by name.
    pub fn get(&self, name: &str) -> Option<&DriverDescriptor> {
        self.descriptors.iter().find(|d| d.name == name)
    }

    /// Descriptors in preference order.
    pub fn iter(&self) -> impl Iterator<Item = &DriverDescriptor> {
        self.descriptors.iter()
    }

    /// Driver names in preference order.
    pub fn names(&self) -> Vec<String> {
        self.descriptors.iter().map(|d| d.name.clone()).collect()
    }
}

fn builtin_descriptors() -> Vec<DriverDescriptor> {
    vec![
        DriverDescriptor::redb(),
        DriverDescriptor::sqlite(),
        DriverDescriptor::local_storage(),
    ]
}

/// Builder for a [`DriverRegistry`].
#[derive(Default)]
pub struct DriverRegistryBuilder {
    descriptors: Vec<DriverDescriptor>,
}

impl DriverRegistryBuilder {
    /// Adds the three built-in drivers.
    #[must_use]
    pub fn with_builtin(mut self) -> Self {
        self.descriptors.extend(builtin_descriptors());
        self
    }

    /// Adds a driver descriptor.
    #[must_use]
    pub fn register(mut self, descriptor: DriverDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Freezes the registry, ordering descriptors by rank (stable).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the registry is empty or two
    /// descriptors share a name.
    pub fn build(mut self) -> Result<Arc<DriverRegistry>> {
        if self.descriptors.is_empty() {
            return Err(Error::config("driver registry is empty"));
        }

        let mut seen = HashSet::new();
        for d in &self.descriptors {
            if !seen.insert(d.name.as_str()) {
                return Err(Error::config(format!("driver '{}' registered twice", d.name)));
            }
        }

        self.descriptors.sort_by_key(|d| d.rank);
        Ok(Arc::new(DriverRegistry {
            descriptors: self.descriptors,
        }))
    }
}
