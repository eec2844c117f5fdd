//! Terminal output formatting: values and error boxes.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use unikv::{BackendErrorKind, Error, Value};

use crate::utils::format_bytes;

/// Width of error box separators.
const ERROR_BOX_WIDTH: usize = 60;

/// How blobs appear in JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobStyle {
    /// `"<blob 1.5 KB>"`
    Summary,
    /// `{"blob": "<base64>"}`
    Base64,
}

/// Serializes a value as display JSON, keeping object field order.
pub struct Rendered<'a> {
    value: &'a Value,
    blobs: BlobStyle,
}

impl<'a> Rendered<'a> {
    pub fn new(value: &'a Value, blobs: BlobStyle) -> Self {
        Self { value, blobs }
    }

    fn child(&self, value: &'a Value) -> Self {
        Self::new(value, self.blobs)
    }
}

impl Serialize for Rendered<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.value {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Blob(bytes) => match self.blobs {
                BlobStyle::Summary => serializer
                    .serialize_str(&format!("<blob {}>", format_bytes(bytes.len() as u64))),
                BlobStyle::Base64 => {
                    let mut map = serializer.serialize_map(Some(1))?;
                    map.serialize_entry("blob", &STANDARD.encode(bytes))?;
                    map.end()
                },
            },
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&self.child(item))?;
                }
                seq.end()
            },
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, item) in fields {
                    map.serialize_entry(key, &self.child(item))?;
                }
                map.end()
            },
        }
    }
}

/// Renders a value as one line of JSON.
pub fn render_json(value: &Value, blobs: BlobStyle) -> String {
    serde_json::to_string(&Rendered::new(value, blobs)).unwrap_or_else(|e| format!("<{e}>"))
}

/// Renders a value on one line, with blobs summarised.
pub fn render_value(value: &Value) -> String {
    render_json(value, BlobStyle::Summary)
}

/// Print an error box with a title, the cause chain and optional hints.
///
/// ```text
/// ============================================================
/// Failed to select a storage driver
/// ============================================================
///
/// caused by: no storage driver available (tried: redb, sqlite, localstorage)
///
/// hint: check that the data directory is writable (--data-dir)
/// ```
pub fn print_error(err: &anyhow::Error) {
    eprintln!("\n{}", "=".repeat(ERROR_BOX_WIDTH));
    eprintln!("{err}");
    eprintln!("{}", "=".repeat(ERROR_BOX_WIDTH));

    let causes: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
    if !causes.is_empty() {
        eprintln!();
        for cause in &causes {
            eprintln!("caused by: {cause}");
        }
    }

    let hints = err
        .chain()
        .find_map(|e| e.downcast_ref::<Error>())
        .map(hints_for)
        .unwrap_or_default();
    if !hints.is_empty() {
        eprintln!();
        for hint in hints {
            eprintln!("hint: {hint}");
        }
    }
}

fn hints_for(err: &Error) -> Vec<&'static str> {
    match err {
        Error::NoDriverAvailable { .. } => {
            vec!["check that the data directory is writable (--data-dir or UNIKV_HOME)"]
        },
        Error::DriverUnavailable { .. } => vec![
            "run `unikv drivers` to see which drivers are usable",
            "drop --driver to let unikv pick one",
        ],
        Error::Backend {
            kind: BackendErrorKind::ConnectionBlocked,
            ..
        } => vec!["another process has the database open; close it and retry"],
        Error::Backend {
            kind: BackendErrorKind::QuotaExceeded,
            ..
        } => vec!["raise local_quota_bytes in the config file or free some space"],
        _ => Vec::new(),
    }
}
