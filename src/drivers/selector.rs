//! Driver selection.
//!
//! Walks candidate descriptors in order, probes each, and opens the first
//! one that reports available. Selection is blocking (probes touch the
//! filesystem) and is run by the store worker on the blocking pool.
//!
//! Candidate order:
//! 1. Names passed to `set_driver`, if any (hard constraint)
//! 2. `driver_order` from the config, if non-empty (hard constraint)
//! 3. Registry order (falls back down to the local-storage driver)

use std::sync::Arc;

use super::{Driver, DriverDescriptor, DriverRegistry};
use crate::config::StoreConfig;
use crate::error::{Error, Result};

/// Where the candidate list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    /// Caller named the drivers explicitly.
    Explicit(&'a [String]),
    /// Use the config's `driver_order`, or registry order when empty.
    Default,
}

/// Selects and opens a driver.
///
/// # Errors
///
/// - [`Error::DriverUnavailable`] if the candidates were named explicitly
///   (by `set_driver` or `driver_order`) and none could be used
/// - [`Error::NoDriverAvailable`] if no registry driver could be used
pub fn select(
    registry: &DriverRegistry,
    config: &StoreConfig,
    request: Request<'_>,
) -> Result<Arc<dyn Driver>> {
    let explicit = match request {
        Request::Explicit(names) => Some(names),
        Request::Default if !config.driver_order.is_empty() => Some(config.driver_order.as_slice()),
        Request::Default => None,
    };

    let candidates: Vec<&DriverDescriptor> = match explicit {
        Some(names) => names
            .iter()
            .filter_map(|name| {
                let found = registry.get(name);
                if found.is_none() {
                    tracing::warn!(driver = %name, "Requested driver is not registered");
                }
                found
            })
            .collect(),
        None => registry.iter().collect(),
    };

    for descriptor in &candidates {
        if !descriptor.probe(config) {
            tracing::debug!(driver = descriptor.name(), "Driver probe reported unavailable");
            continue;
        }

        match descriptor.open(config) {
            Ok(driver) => {
                tracing::info!(
                    driver = descriptor.name(),
                    name = %config.name,
                    store = %config.store_name,
                    "Selected storage driver"
                );
                return Ok(driver);
            },
            Err(e) => {
                tracing::warn!(driver = descriptor.name(), error = %e, "Driver failed to open");
            },
        }
    }

    match explicit {
        Some(names) => Err(Error::DriverUnavailable {
            requested: names.to_vec(),
        }),
        None => Err(Error::NoDriverAvailable {
            tried: candidates.iter().map(|d| d.name().to_string()).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{LOCAL_STORAGE, REDB, SQLITE};
    use tempfile::TempDir;

    // Lets tests call `unwrap_err()` on `Result<Arc<dyn Driver>>`.
    impl std::fmt::Debug for dyn Driver {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_tuple("Driver").field(&self.name()).finish()
        }
    }

    fn registry_with(available: &'static [&'static str]) -> Arc<DriverRegistry> {
        let probe_for = |d: DriverDescriptor| {
            let up = available.contains(&d.name());
            d.with_probe(move |_| up)
        };
        DriverRegistry::builder()
            .register(probe_for(DriverDescriptor::redb()))
            .register(probe_for(DriverDescriptor::sqlite()))
            .register(probe_for(DriverDescriptor::local_storage()))
            .build()
            .unwrap()
    }

    fn config(tmp: &TempDir) -> StoreConfig {
        StoreConfig::new("selector").with_data_dir(tmp.path())
    }

    #[test]
    fn test_prefers_highest_rank() {
        let tmp = TempDir::new().unwrap();
        let registry = registry_with(&[REDB, SQLITE, LOCAL_STORAGE]);
        let driver = select(&registry, &config(&tmp), Request::Default).unwrap();
        assert_eq!(driver.name(), REDB);
    }

    #[test]
    fn test_falls_back_to_local_storage() {
        let tmp = TempDir::new().unwrap();
        let registry = registry_with(&[LOCAL_STORAGE]);
        let driver = select(&registry, &config(&tmp), Request::Default).unwrap();
        assert_eq!(driver.name(), LOCAL_STORAGE);
    }

    #[test]
    fn test_no_driver_available() {
        let tmp = TempDir::new().unwrap();
        let registry = registry_with(&[]);
        let err = select(&registry, &config(&tmp), Request::Default).unwrap_err();
        assert_eq!(
            err,
            Error::NoDriverAvailable {
                tried: vec![REDB.into(), SQLITE.into(), LOCAL_STORAGE.into()]
            }
        );
    }

    #[test]
    fn test_explicit_request_does_not_fall_back() {
        let tmp = TempDir::new().unwrap();
        let registry = registry_with(&[LOCAL_STORAGE]);
        let names = vec![REDB.to_string()];
        let err = select(&registry, &config(&tmp), Request::Explicit(&names)).unwrap_err();
        assert_eq!(err, Error::DriverUnavailable { requested: names });
    }

    #[test]
    fn test_explicit_list_picks_first_available() {
        let tmp = TempDir::new().unwrap();
        let registry = registry_with(&[SQLITE, LOCAL_STORAGE]);
        let names = vec![REDB.to_string(), LOCAL_STORAGE.to_string(), SQLITE.to_string()];
        let driver = select(&registry, &config(&tmp), Request::Explicit(&names)).unwrap();
        assert_eq!(driver.name(), LOCAL_STORAGE);
    }

    #[test]
    fn test_unknown_explicit_name_unavailable() {
        let tmp = TempDir::new().unwrap();
        let registry = registry_with(&[REDB, SQLITE, LOCAL_STORAGE]);
        let names = vec!["indexeddb".to_string()];
        let err = select(&registry, &config(&tmp), Request::Explicit(&names)).unwrap_err();
        assert!(matches!(err, Error::DriverUnavailable { .. }));
    }

    #[test]
    fn test_config_driver_order_is_a_constraint() {
        let tmp = TempDir::new().unwrap();
        let registry = registry_with(&[REDB, LOCAL_STORAGE]);
        let cfg = config(&tmp).with_driver_order([SQLITE]);
        let err = select(&registry, &cfg, Request::Default).unwrap_err();
        assert!(matches!(err, Error::DriverUnavailable { .. }));

        let cfg = config(&tmp).with_driver_order([LOCAL_STORAGE, REDB]);
        let driver = select(&registry, &cfg, Request::Default).unwrap();
        assert_eq!(driver.name(), LOCAL_STORAGE);
    }

    #[test]
    fn test_open_failure_moves_to_next_candidate() {
        let tmp = TempDir::new().unwrap();
        let registry = DriverRegistry::builder()
            .register(DriverDescriptor::new("broken", 0, |_| true, |_| {
                Err(Error::config("cannot open"))
            }))
            .register(DriverDescriptor::local_storage())
            .build()
            .unwrap();
        let driver = select(&registry, &config(&tmp), Request::Default).unwrap();
        assert_eq!(driver.name(), LOCAL_STORAGE);
    }
}
