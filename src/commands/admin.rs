//! Store administration commands.
//!
//! - `unikv clear` - remove every entry of the store
//! - `unikv drop` - drop the store's namespace from its backend
//! - `unikv drivers` - show which drivers can run with the current options

use anyhow::{Context, Result};
use unikv::drivers::DriverRegistry;
use unikv::paths;

use super::StoreArgs;
use crate::utils::format_bytes;

/// Execute `clear`.
pub async fn clear(args: &StoreArgs) -> Result<()> {
    let store = args.open().await?;
    let count = store.length().await.context("Failed to count entries")?;
    store.clear().await.context("Failed to clear store")?;

    let config = store.config();
    println!(
        "Cleared {count} entries from {}/{}",
        config.name, config.store_name
    );
    Ok(())
}

/// Execute `drop`.
pub async fn drop_store(args: &StoreArgs) -> Result<()> {
    let store = args.open().await?;
    store.drop_instance().await.context("Failed to drop store")?;

    let config = store.config();
    println!(
        "Dropped {}/{} ({})",
        config.name,
        config.store_name,
        store.driver().unwrap_or_default()
    );
    Ok(())
}

/// Execute `drivers`.
pub fn drivers(args: &StoreArgs) -> Result<()> {
    let config = args.store_config()?;
    let registry = DriverRegistry::builtin();

    println!("{:<14} {:<6} STATUS", "DRIVER", "RANK");
    for descriptor in registry.iter() {
        let requested = args.drivers.is_empty() || args.drivers.iter().any(|d| d == descriptor.name());
        let status = match (descriptor.probe(&config), requested) {
            (true, true) => "available",
            (true, false) => "available (not requested)",
            (false, _) => "unavailable",
        };
        println!("{:<14} {:<6} {status}", descriptor.name(), descriptor.rank());
    }

    let dir = config.resolved_data_dir();
    println!();
    println!("Data directory: {}", dir.display());

    let local = paths::local_storage_path(&dir);
    if let Ok(meta) = std::fs::metadata(&local) {
        println!(
            "Local storage:  {} ({} of {} quota)",
            local.display(),
            format_bytes(meta.len()),
            format_bytes(config.local_quota_bytes)
        );
    }
    Ok(())
}
