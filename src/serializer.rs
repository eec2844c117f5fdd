//! Serialization layer between [`Value`] and backend-native representations.
//!
//! Three representations are produced from the same rules:
//!
//! - **Text** (`to_text` / `from_text`): JSON-safe string used by the
//!   local-storage driver. Values without blobs are plain JSON. A top-level
//!   blob is written as `__unikv__:blob:<base64>`; any composite containing
//!   a blob is written as `__unikv__:tagged:<json>` where every node carries
//!   an explicit kind tag.
//! - **Bytes** (`to_bytes` / `from_bytes`): one leading format byte, then
//!   either raw blob bytes (`B`) or the text form (`T`). Used by redb.
//! - **Native** (`to_native` / `from_native`): blob values stay blobs, all
//!   other values use the text form. Used by SQLite, which stores both
//!   storage classes in the same column.
//!
//! Objects are written in their stored key order and read back in document
//! order, so ordering survives without extra markers. Floats always carry a
//! fraction or exponent in JSON, which keeps them distinct from integers.
//!
//! The marker strings and format bytes are a persistence format: changing
//! them makes previously stored entries unreadable.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::de::{self, DeserializeSeed, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::value::Value;

/// Prefix of every non-plain text encoding.
pub const MARKER: &str = "__unikv__:";
const BLOB_KIND: &str = "blob";
const TAGGED_KIND: &str = "tagged";

/// Deepest array/object nesting accepted on write.
///
/// The tagged form spends up to three JSON levels per container and the JSON
/// reader stops at 128, so deeper values could be written but never read.
pub const MAX_NESTING: usize = 32;

/// Leading byte of a raw blob in the binary form.
const BYTES_BLOB: u8 = b'B';
/// Leading byte of a text payload in the binary form.
const BYTES_TEXT: u8 = b'T';

/// A backend-native representation with separate text and binary classes.
#[derive(Debug, Clone, PartialEq)]
pub enum Native {
    Text(String),
    Blob(Vec<u8>),
}

// =============================================================================
// Public API
// =============================================================================

/// Encodes a value as JSON-safe text.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the value holds a non-finite float
/// or nests containers deeper than [`MAX_NESTING`].
pub fn to_text(value: &Value) -> Result<String> {
    check_storable(value, 0)?;
    match value {
        Value::Blob(bytes) => Ok(format!("{MARKER}{BLOB_KIND}:{}", STANDARD.encode(bytes))),
        v if v.contains_blob() => {
            let json = serde_json::to_string(&Tagged::from(v))?;
            Ok(format!("{MARKER}{TAGGED_KIND}:{json}"))
        },
        v => Ok(serde_json::to_string(&Plain(v))?),
    }
}

/// Decodes text produced by [`to_text`].
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the text is not a valid encoding.
pub fn from_text(text: &str) -> Result<Value> {
    let Some(rest) = text.strip_prefix(MARKER) else {
        let PlainOwned(value) = serde_json::from_str(text)?;
        return Ok(value);
    };

    let (kind, payload) = rest
        .split_once(':')
        .ok_or_else(|| Error::serialization("truncated type marker"))?;

    match kind {
        BLOB_KIND => STANDARD
            .decode(payload)
            .map(Value::Blob)
            .map_err(|e| Error::serialization(format!("invalid base64 blob: {e}"))),
        TAGGED_KIND => {
            let tagged: Tagged = serde_json::from_str(payload)?;
            Ok(tagged.into())
        },
        other => Err(Error::serialization(format!("unknown type marker '{other}'"))),
    }
}

/// Encodes a value as bytes.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the value cannot be written as text.
pub fn to_bytes(value: &Value) -> Result<Vec<u8>> {
    match to_native(value)? {
        Native::Blob(bytes) => {
            let mut out = Vec::with_capacity(bytes.len() + 1);
            out.push(BYTES_BLOB);
            out.extend_from_slice(&bytes);
            Ok(out)
        },
        Native::Text(text) => {
            let mut out = Vec::with_capacity(text.len() + 1);
            out.push(BYTES_TEXT);
            out.extend_from_slice(text.as_bytes());
            Ok(out)
        },
    }
}

/// Decodes bytes produced by [`to_bytes`].
///
/// # Errors
///
/// Returns [`Error::Serialization`] on an unknown format byte or invalid payload.
pub fn from_bytes(bytes: &[u8]) -> Result<Value> {
    match bytes.split_first() {
        Some((&BYTES_BLOB, rest)) => Ok(Value::Blob(rest.to_vec())),
        Some((&BYTES_TEXT, rest)) => {
            let text = std::str::from_utf8(rest)
                .map_err(|e| Error::serialization(format!("text payload is not UTF-8: {e}")))?;
            from_text(text)
        },
        Some((other, _)) => Err(Error::serialization(format!(
            "unknown format byte 0x{other:02x}"
        ))),
        None => Err(Error::serialization("empty payload")),
    }
}

/// Encodes a value for a backend with native text and blob classes.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the value cannot be written as text.
pub fn to_native(value: &Value) -> Result<Native> {
    match value {
        Value::Blob(bytes) => Ok(Native::Blob(bytes.clone())),
        v => to_text(v).map(Native::Text),
    }
}

/// Decodes a native representation produced by [`to_native`].
///
/// # Errors
///
/// Returns [`Error::Serialization`] if a text payload is invalid.
pub fn from_native(native: Native) -> Result<Value> {
    match native {
        Native::Blob(bytes) => Ok(Value::Blob(bytes)),
        Native::Text(text) => from_text(&text),
    }
}

/// Rejects keys that not every backend can store.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the key contains a NUL character.
pub fn check_key(key: &str) -> Result<()> {
    if key.contains('\0') {
        return Err(Error::serialization("keys must not contain NUL characters"));
    }
    Ok(())
}

fn check_storable(value: &Value, depth: usize) -> Result<()> {
    match value {
        Value::Float(f) if !f.is_finite() => Err(Error::serialization(format!(
            "non-finite float {f} cannot be stored"
        ))),
        Value::Array(_) | Value::Object(_) if depth >= MAX_NESTING => Err(Error::serialization(
            format!("values nested deeper than {MAX_NESTING} levels cannot be stored"),
        )),
        Value::Array(items) => items.iter().try_for_each(|v| check_storable(v, depth + 1)),
        Value::Object(fields) => fields
            .iter()
            .try_for_each(|(_, v)| check_storable(v, depth + 1)),
        _ => Ok(()),
    }
}

// =============================================================================
// Plain JSON form (no blobs)
// =============================================================================

struct Plain<'a>(&'a Value);

impl Serialize for Plain<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Blob(_) => Err(serde::ser::Error::custom(
                "blob values require the tagged form",
            )),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(&Plain(item))?;
                }
                seq.end()
            },
            Value::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (k, v) in fields {
                    map.serialize_entry(k, &Plain(v))?;
                }
                map.end()
            },
        }
    }
}

struct PlainOwned(Value);

impl<'de> Deserialize<'de> for PlainOwned {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        PlainSeed.deserialize(deserializer).map(PlainOwned)
    }
}

#[derive(Clone, Copy)]
struct PlainSeed;

impl<'de> DeserializeSeed<'de> for PlainSeed {
    type Value = Value;

    fn deserialize<D: Deserializer<'de>>(self, deserializer: D) -> std::result::Result<Value, D::Error> {
        deserializer.deserialize_any(PlainVisitor)
    }
}

struct PlainVisitor;

impl<'de> Visitor<'de> for PlainVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Value, E> {
        Ok(Value::Integer(v))
    }

    #[allow(clippy::cast_precision_loss)]
    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Value, E> {
        // Only reachable for hand-written JSON above i64::MAX.
        Ok(i64::try_from(v).map_or(Value::Float(v as f64), Value::Integer))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Value, E> {
        Ok(Value::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element_seed(PlainSeed)? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Value, A::Error> {
        let mut fields = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some(key) = map.next_key::<String>()? {
            let value = map.next_value_seed(PlainSeed)?;
            fields.push((key, value));
        }
        Ok(Value::Object(fields))
    }
}

// =============================================================================
// Tagged form (composites containing blobs)
// =============================================================================

#[derive(Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "lowercase")]
enum Tagged {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Blob(#[serde(with = "base64_bytes")] Vec<u8>),
    Arr(Vec<Tagged>),
    Obj(Vec<(String, Tagged)>),
}

impl From<&Value> for Tagged {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Integer(i) => Self::Int(*i),
            Value::Float(f) => Self::Float(*f),
            Value::String(s) => Self::Str(s.clone()),
            Value::Blob(b) => Self::Blob(b.clone()),
            Value::Array(items) => Self::Arr(items.iter().map(Self::from).collect()),
            Value::Object(fields) => Self::Obj(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<Tagged> for Value {
    fn from(tagged: Tagged) -> Self {
        match tagged {
            Tagged::Null => Self::Null,
            Tagged::Bool(b) => Self::Bool(b),
            Tagged::Int(i) => Self::Integer(i),
            Tagged::Float(f) => Self::Float(f),
            Tagged::Str(s) => Self::String(s),
            Tagged::Blob(b) => Self::Blob(b),
            Tagged::Arr(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Tagged::Obj(fields) => {
                Self::Object(fields.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            },
        }
    }
}

mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests;
