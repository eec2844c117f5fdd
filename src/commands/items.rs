//! Single-key commands.
//!
//! - `unikv get <key> [--out FILE]` - print a value, or save a blob to a file
//! - `unikv set <key> <json>` - store a JSON value (`--text` stores a string,
//!   `--blob-file` stores a file's bytes)
//! - `unikv rm <key>` - remove a key
//! - `unikv key <index>` - print the key at an insertion-order index

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;
use unikv::{Error, Value, serializer};

use super::StoreArgs;
use crate::ui;
use crate::utils::format_bytes;

/// Execute `get`.
pub async fn get(args: &StoreArgs, key: &str, out: Option<&Path>) -> Result<()> {
    let store = args.open().await?;
    let value = store
        .get_item(key)
        .await
        .with_context(|| format!("Failed to read '{key}'"))?
        .ok_or_else(|| Error::NotFound(key.to_string()))?;

    match (out, value) {
        (Some(path), Value::Blob(bytes)) => {
            fs::write(path, &bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "Wrote {} to {}",
                format_bytes(bytes.len() as u64),
                path.display()
            );
        },
        (Some(_), other) => bail!("'{key}' holds a {} value, not a blob", other.kind()),
        (None, value) => println!("{}", ui::render_value(&value)),
    }
    Ok(())
}

/// Execute `set`.
pub async fn set(
    args: &StoreArgs,
    key: &str,
    value: Option<String>,
    blob_file: Option<&Path>,
    text: bool,
) -> Result<()> {
    let value = match (blob_file, value) {
        (Some(path), _) => Value::Blob(
            fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?,
        ),
        (None, Some(raw)) if text => Value::String(raw),
        (None, Some(raw)) => parse_json(&raw)?,
        (None, None) => bail!("a value or --blob-file is required"),
    };

    let store = args.open().await?;
    let kind = value.kind();
    store
        .set_item(key, value)
        .await
        .with_context(|| format!("Failed to store '{key}'"))?;
    tracing::info!(key, kind, "Stored value");
    Ok(())
}

/// Execute `rm`.
pub async fn remove(args: &StoreArgs, key: &str) -> Result<()> {
    let store = args.open().await?;
    store
        .remove_item(key)
        .await
        .with_context(|| format!("Failed to remove '{key}'"))?;
    Ok(())
}

/// Execute `key`.
pub async fn key(args: &StoreArgs, index: u64) -> Result<()> {
    let store = args.open().await?;
    let key = store
        .key(index)
        .await
        .context("Failed to read keys")?
        .ok_or_else(|| Error::NotFound(format!("index {index}")))?;
    println!("{key}");
    Ok(())
}

/// Parses a command-line value as JSON.
fn parse_json(raw: &str) -> Result<Value> {
    serializer::from_text(raw)
        .with_context(|| format!("'{raw}' is not valid JSON (use --text to store it as a string)"))
}
