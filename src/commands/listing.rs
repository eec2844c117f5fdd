//! Whole-store read commands: `len`, `keys` and `dump`.

use anyhow::{Context, Result};
use serde::Serialize;

use super::StoreArgs;
use crate::ui::{self, BlobStyle, Rendered};

#[derive(Serialize)]
struct DumpLine<'a> {
    key: &'a str,
    value: Rendered<'a>,
}

/// Execute `len`.
pub async fn length(args: &StoreArgs) -> Result<()> {
    let store = args.open().await?;
    let count = store.length().await.context("Failed to count entries")?;
    println!("{count}");
    Ok(())
}

/// Execute `keys`.
pub async fn keys(args: &StoreArgs) -> Result<()> {
    let store = args.open().await?;
    for key in store.keys().await.context("Failed to list keys")? {
        println!("{key}");
    }
    Ok(())
}

/// Execute `dump`.
///
/// Plain output is `<n>  <key> = <value>` with blobs summarised; `--json`
/// prints one `{"key", "value"}` object per line with blobs base64-encoded.
pub async fn dump(args: &StoreArgs, json: bool) -> Result<()> {
    let store = args.open().await?;
    let visited = store
        .iterate(move |key, value, n| {
            if json {
                let line = DumpLine {
                    key: &key,
                    value: Rendered::new(&value, BlobStyle::Base64),
                };
                match serde_json::to_string(&line) {
                    Ok(line) => println!("{line}"),
                    Err(e) => tracing::warn!(key = %key, error = %e, "Skipping entry"),
                }
            } else {
                println!("{n:>4}  {key} = {}", ui::render_value(&value));
            }
            None::<()>
        })
        .await;
    visited.context("Failed to read entries")?;
    Ok(())
}
