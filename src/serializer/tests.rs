//! Tests for the serialization layer.

use super::*;
use proptest::prelude::*;

fn sample_values() -> Vec<Value> {
    vec![
        Value::Null,
        Value::Bool(true),
        Value::Bool(false),
        Value::Integer(0),
        Value::Integer(-42),
        Value::Integer(i64::MAX),
        Value::Float(0.0),
        Value::Float(1.0),
        Value::Float(-3.25),
        Value::Float(1e300),
        Value::String(String::new()),
        Value::String("hello".to_string()),
        Value::String(format!("{MARKER}blob:AAAA")),
        Value::Blob(Vec::new()),
        Value::Blob((0..=255).collect()),
        Value::Array(vec![]),
        Value::Object(vec![]),
        Value::Object(vec![
            ("z".to_string(), Value::Integer(1)),
            ("a".to_string(), Value::Array(vec![Value::Null, Value::Float(2.5)])),
            ("m".to_string(), Value::Object(vec![("y".to_string(), Value::Bool(false))])),
        ]),
        Value::Object(vec![
            ("data".to_string(), Value::Blob(vec![0, 159, 146, 150])),
            ("name".to_string(), Value::String("img".to_string())),
        ]),
    ]
}

#[test]
fn test_text_round_trip_all_kinds() {
    for value in sample_values() {
        let text = to_text(&value).unwrap();
        assert_eq!(from_text(&text).unwrap(), value, "text form: {text}");
    }
}

#[test]
fn test_bytes_round_trip_all_kinds() {
    for value in sample_values() {
        let bytes = to_bytes(&value).unwrap();
        assert_eq!(from_bytes(&bytes).unwrap(), value);
    }
}

#[test]
fn test_native_round_trip_all_kinds() {
    for value in sample_values() {
        let native = to_native(&value).unwrap();
        assert_eq!(from_native(native).unwrap(), value);
    }
}

#[test]
fn test_plain_values_are_plain_json() {
    assert_eq!(to_text(&Value::Integer(5)).unwrap(), "5");
    assert_eq!(to_text(&Value::Float(5.0)).unwrap(), "5.0");
    assert_eq!(to_text(&Value::String("x".into())).unwrap(), "\"x\"");
    assert_eq!(to_text(&Value::Null).unwrap(), "null");
}

#[test]
fn test_integer_and_float_stay_distinct() {
    assert_eq!(from_text("1").unwrap(), Value::Integer(1));
    assert_eq!(from_text("1.0").unwrap(), Value::Float(1.0));
}

#[test]
fn test_object_key_order_preserved() {
    let text = to_text(&Value::Object(vec![
        ("b".to_string(), Value::Integer(1)),
        ("a".to_string(), Value::Integer(2)),
    ]))
    .unwrap();
    assert_eq!(text, r#"{"b":1,"a":2}"#);
}

#[test]
fn test_top_level_blob_uses_marker() {
    let text = to_text(&Value::Blob(vec![1, 2, 3])).unwrap();
    assert_eq!(text, "__unikv__:blob:AQID");
}

#[test]
fn test_nested_blob_uses_tagged_form() {
    let value = Value::Array(vec![Value::Blob(vec![255])]);
    let text = to_text(&value).unwrap();
    assert_eq!(
        text,
        r#"__unikv__:tagged:{"t":"arr","v":[{"t":"blob","v":"/w=="}]}"#
    );
}

#[test]
fn test_stored_format_fixtures_stay_readable() {
    // Entries written by earlier releases must decode unchanged.
    assert_eq!(
        from_text("__unikv__:blob:aGk=").unwrap(),
        Value::Blob(b"hi".to_vec())
    );
    assert_eq!(
        from_text(r#"__unikv__:tagged:{"t":"obj","v":[["k",{"t":"blob","v":""}]]}"#).unwrap(),
        Value::Object(vec![("k".to_string(), Value::Blob(vec![]))])
    );
    assert_eq!(from_bytes(b"T[1,true]").unwrap(), Value::Array(vec![
        Value::Integer(1),
        Value::Bool(true)
    ]));
    assert_eq!(from_bytes(b"B\x00\x01").unwrap(), Value::Blob(vec![0, 1]));
}

#[test]
fn test_non_finite_float_rejected() {
    for f in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let nested = Value::Array(vec![Value::Float(f)]);
        assert!(matches!(to_text(&nested), Err(Error::Serialization(_))));
        assert!(matches!(to_bytes(&Value::Float(f)), Err(Error::Serialization(_))));
    }
}

/// `levels` containers wrapped around `leaf`, alternating arrays and objects.
fn nested(levels: usize, leaf: Value) -> Value {
    (0..levels).fold(leaf, |inner, i| {
        if i % 2 == 0 {
            Value::Array(vec![inner])
        } else {
            Value::Object(vec![("k".to_string(), inner)])
        }
    })
}

#[test]
fn test_deepest_allowed_nesting_round_trips() {
    for leaf in [Value::Integer(1), Value::Blob(vec![7, 8])] {
        let value = nested(MAX_NESTING, leaf);
        let text = to_text(&value).unwrap();
        assert_eq!(from_text(&text).unwrap(), value);
        let bytes = to_bytes(&value).unwrap();
        assert_eq!(from_bytes(&bytes).unwrap(), value);
    }
}

#[test]
fn test_all_object_nesting_round_trips_in_tagged_form() {
    let value = (0..MAX_NESTING).fold(Value::Blob(vec![1]), |inner, _| {
        Value::Object(vec![("k".to_string(), inner)])
    });
    let text = to_text(&value).unwrap();
    assert!(text.starts_with("__unikv__:tagged:"));
    assert_eq!(from_text(&text).unwrap(), value);
}

#[test]
fn test_over_deep_value_rejected_on_write() {
    let value = nested(MAX_NESTING + 1, Value::Null);
    assert!(matches!(to_text(&value), Err(Error::Serialization(_))));
    assert!(matches!(to_native(&value), Err(Error::Serialization(_))));

    let deep = nested(200, Value::Null);
    assert!(matches!(to_bytes(&deep), Err(Error::Serialization(_))));
}

#[test]
fn test_invalid_encodings_rejected() {
    assert!(from_text("__unikv__:nope:x").is_err());
    assert!(from_text("__unikv__:").is_err());
    assert!(from_text("__unikv__:blob:!!!").is_err());
    assert!(from_text("{not json").is_err());
    assert!(from_bytes(b"").is_err());
    assert!(from_bytes(b"Xabc").is_err());
    assert!(from_bytes(b"T\xff").is_err());
}

#[test]
fn test_check_key() {
    assert!(check_key("").is_ok());
    assert!(check_key("user:1").is_ok());
    assert!(check_key("a\0b").is_err());
}

fn arb_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        any::<f64>()
            .prop_filter("finite", |f| f.is_finite())
            .prop_map(Value::Float),
        ".*".prop_map(Value::String),
        prop::collection::vec(any::<u8>(), 0..64).prop_map(Value::Blob),
    ];
    leaf.prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::vec(("[a-z]{0,6}", inner), 0..6).prop_map(Value::Object),
        ]
    })
}

proptest! {
    #[test]
    fn prop_text_round_trip(value in arb_value()) {
        let text = to_text(&value).unwrap();
        prop_assert_eq!(from_text(&text).unwrap(), value);
    }

    #[test]
    fn prop_bytes_round_trip(value in arb_value()) {
        let bytes = to_bytes(&value).unwrap();
        prop_assert_eq!(from_bytes(&bytes).unwrap(), value);
    }
}
