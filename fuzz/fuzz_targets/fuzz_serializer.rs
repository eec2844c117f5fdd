//! Fuzz target for the value serializer.
//!
//! Checks that:
//! 1. Decoding arbitrary text or bytes never panics
//! 2. Every encodable value decodes back to itself, in both text and byte form
//!
//! Run with: `cargo +nightly fuzz run fuzz_serializer`

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use unikv::{Value, serializer};

/// Nesting limit for generated values.
const MAX_DEPTH: usize = 8;

#[derive(Arbitrary, Debug)]
struct SerializerInput {
    raw_text: String,
    raw_bytes: Vec<u8>,
    value: FuzzValue,
}

#[derive(Arbitrary, Debug)]
enum FuzzValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Blob(Vec<u8>),
    Array(Vec<FuzzValue>),
    Object(Vec<(String, FuzzValue)>),
}

impl FuzzValue {
    fn to_value(&self, depth: usize) -> Value {
        if depth > MAX_DEPTH {
            return Value::Null;
        }
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(n) => Value::Integer(*n),
            Self::Float(f) => Value::Float(*f),
            Self::String(s) => Value::String(s.clone()),
            Self::Blob(b) => Value::Blob(b.clone()),
            Self::Array(items) => Value::Array(items.iter().map(|v| v.to_value(depth + 1)).collect()),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_value(depth + 1)))
                    .collect(),
            ),
        }
    }
}

fn has_non_finite(value: &Value) -> bool {
    match value {
        Value::Float(f) => !f.is_finite(),
        Value::Array(items) => items.iter().any(has_non_finite),
        Value::Object(fields) => fields.iter().any(|(_, v)| has_non_finite(v)),
        _ => false,
    }
}

fuzz_target!(|input: SerializerInput| {
    let _ = serializer::from_text(&input.raw_text);
    let _ = serializer::from_bytes(&input.raw_bytes);

    let value = input.value.to_value(0);
    let text = serializer::to_text(&value);
    if has_non_finite(&value) {
        assert!(text.is_err(), "non-finite float must be rejected");
        return;
    }

    let text = text.expect("finite values always encode");
    assert_eq!(serializer::from_text(&text).expect("own text decodes"), value);

    let bytes = serializer::to_bytes(&value).expect("finite values always encode");
    assert_eq!(serializer::from_bytes(&bytes).expect("own bytes decode"), value);
});
