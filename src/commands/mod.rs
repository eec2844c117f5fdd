//! CLI command implementations for unikv.
//!
//! - [`items`] - single-key commands (`get`, `set`, `rm`, `key`)
//! - [`listing`] - whole-store reads (`len`, `keys`, `dump`)
//! - [`admin`] - `clear`, `drop` and `drivers`

pub mod admin;
pub mod items;
pub mod listing;

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use unikv::{Store, StoreConfig};

use crate::Commands;

/// Options selecting which store a command works on.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Directory holding the backend files (default: $UNIKV_HOME or the
    /// platform data directory)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Database name
    #[arg(long, global = true)]
    pub name: Option<String>,

    /// Store name inside the database
    #[arg(long = "store", global = true)]
    pub store: Option<String>,

    /// Restrict to these drivers, in order (repeatable)
    #[arg(long = "driver", global = true)]
    pub drivers: Vec<String>,

    /// TOML file with store options; flags override it
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

impl StoreArgs {
    /// Builds the store config from the config file and flags.
    pub fn store_config(&self) -> Result<StoreConfig> {
        let mut config = match &self.config {
            Some(path) => StoreConfig::load_from(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => StoreConfig::default(),
        };

        if let Some(name) = &self.name {
            config.name.clone_from(name);
        }
        if let Some(store) = &self.store {
            config.store_name.clone_from(store);
        }
        if let Some(dir) = &self.data_dir {
            config.data_dir = Some(dir.clone());
        }
        Ok(config)
    }

    /// Opens the store and waits for a driver.
    pub async fn open(&self) -> Result<Store> {
        let store = Store::new(self.store_config()?).context("Invalid store options")?;

        let selected = if self.drivers.is_empty() {
            store.ready().await
        } else {
            store.set_driver(self.drivers.clone()).await
        };
        let driver = selected.context("Failed to select a storage driver")?;

        tracing::info!(driver = %driver, "Store ready");
        Ok(store)
    }
}

/// Dispatches a parsed command.
pub async fn execute(command: Commands, args: &StoreArgs) -> Result<()> {
    match command {
        Commands::Get { key, out } => items::get(args, &key, out.as_deref()).await,
        Commands::Set {
            key,
            value,
            blob_file,
            text,
        } => items::set(args, &key, value, blob_file.as_deref(), text).await,
        Commands::Rm { key } => items::remove(args, &key).await,
        Commands::Key { index } => items::key(args, index).await,
        Commands::Len => listing::length(args).await,
        Commands::Keys => listing::keys(args).await,
        Commands::Dump { json } => listing::dump(args, json).await,
        Commands::Clear => admin::clear(args).await,
        Commands::Drop => admin::drop_store(args).await,
        Commands::Drivers => admin::drivers(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_flags_override_config_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("store.toml");
        std::fs::write(&path, "name = \"from-file\"\nstore_name = \"s\"\nversion = 3\n").unwrap();

        let args = StoreArgs {
            config: Some(path),
            store: Some("override".into()),
            ..StoreArgs::default()
        };
        let config = args.store_config().unwrap();
        assert_eq!(config.name, "from-file");
        assert_eq!(config.store_name, "override");
        assert_eq!(config.version, 3);
    }

    #[test]
    fn test_missing_config_file() {
        let args = StoreArgs {
            config: Some(PathBuf::from("/nonexistent/unikv.toml")),
            ..StoreArgs::default()
        };
        let err = args.store_config().unwrap_err();
        assert!(err.to_string().contains("Failed to load config"));
    }
}
