//! Store configuration.
//!
//! [`StoreConfig`] carries the options a store is created with:
//!
//! - `name` - database namespace (one backend file per name)
//! - `store_name` - sub-namespace inside the database (`[A-Za-z0-9_]`)
//! - `version` - schema version recorded by versioned backends
//! - `size` - preallocation / cache hint in bytes
//! - `driver_order` - explicit driver preference list
//!
//! Configs can be built in code or loaded from a TOML file. Missing fields
//! take the defaults below, which match what most applications want.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::paths;

/// Default database name.
pub const DEFAULT_NAME: &str = "unikv";
/// Default sub-namespace.
pub const DEFAULT_STORE_NAME: &str = "keyvaluepairs";
/// Default size hint (just under 5 MiB).
pub const DEFAULT_SIZE: u64 = 4_980_736;
/// Default quota of the local-storage driver.
pub const DEFAULT_LOCAL_QUOTA: u64 = 5 * 1024 * 1024;

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Options for a single store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub name: String,
    pub store_name: String,
    pub version: u32,
    pub size: u64,
    /// Explicit driver preference. Empty means registry order.
    pub driver_order: Vec<String>,
    pub description: String,
    /// Directory for backend files. `None` resolves via [`paths::data_dir`].
    pub data_dir: Option<PathBuf>,
    pub local_quota_bytes: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            store_name: DEFAULT_STORE_NAME.to_string(),
            version: 1,
            size: DEFAULT_SIZE,
            driver_order: Vec::new(),
            description: String::new(),
            data_dir: None,
            local_quota_bytes: DEFAULT_LOCAL_QUOTA,
        }
    }
}

impl StoreConfig {
    /// Creates a config for the named database with default options.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_store_name(mut self, store_name: impl Into<String>) -> Self {
        self.store_name = store_name.into();
        self
    }

    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_driver_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.driver_order = order.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_local_quota(mut self, bytes: u64) -> Self {
        self.local_quota_bytes = bytes;
        self
    }

    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read config file {}: {e}", path.display()))
        })?;

        toml::from_str(&content).map_err(|e| {
            Error::config(format!("failed to parse config file {}: {e}", path.display()))
        })
    }

    /// Directory backend files live in.
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(paths::data_dir)
    }

    /// Validate configuration.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing every problem found:
    /// - Empty or reserved database name
    /// - Empty store name, or one outside `[A-Za-z0-9_]`
    /// - Zero version
    /// - Duplicate or empty entries in `driver_order`
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if self.name.is_empty() {
            errors.push("name cannot be empty".to_string());
        } else if self.name == "." || self.name == ".." {
            errors.push(format!("name '{}' is reserved", self.name));
        }

        if self.store_name.is_empty() {
            errors.push("store_name cannot be empty".to_string());
        } else if !is_valid_store_name(&self.store_name) {
            errors.push(format!(
                "store_name '{}' may only contain [A-Za-z0-9_]",
                self.store_name
            ));
        }

        if self.version == 0 {
            errors.push("version must be at least 1".to_string());
        }

        if self.size == 0 {
            warnings.push("size is 0; backend defaults will be used".to_string());
        }

        let mut seen = HashSet::new();
        for driver in &self.driver_order {
            if driver.is_empty() {
                errors.push("driver_order contains an empty name".to_string());
            } else if !seen.insert(driver.as_str()) {
                errors.push(format!("driver_order lists '{driver}' more than once"));
            }
        }

        if !errors.is_empty() {
            return Err(Error::config(errors.join("; ")));
        }

        Ok(ValidationResult { warnings })
    }
}

/// Whether `name` can be used verbatim as a table name or key prefix.
pub fn is_valid_store_name(name: &str) -> bool {
    name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
