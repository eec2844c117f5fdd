//! End-to-end tests for the public `Store` API.
//!
//! Every scenario runs once per built-in driver, forced with `set_driver`,
//! so the three backends are held to the same observable behaviour.

use std::sync::Arc;

use tempfile::TempDir;
use unikv::drivers::{LOCAL_STORAGE, REDB, SQLITE};
use unikv::{BackendErrorKind, Error, Store, StoreConfig, Value};

const DRIVERS: [&str; 3] = [REDB, SQLITE, LOCAL_STORAGE];

async fn open(tmp: &TempDir, driver: &str, store: &str) -> Store {
    let config = StoreConfig::new("integration")
        .with_store_name(store)
        .with_data_dir(tmp.path());
    let s = Store::new(config).unwrap();
    assert_eq!(s.set_driver([driver]).await.unwrap(), driver);
    s
}

fn profile() -> Value {
    Value::Object(vec![
        ("name".into(), Value::from("Ada")),
        ("age".into(), Value::from(36)),
        ("admin".into(), Value::from(false)),
        ("score".into(), Value::from(99.5)),
        ("avatar".into(), Value::Blob(vec![0x89, b'P', b'N', b'G'])),
        (
            "tags".into(),
            Value::Array(vec![Value::from("math"), Value::Null]),
        ),
    ])
}

// =============================================================================
// Round trips
// =============================================================================

#[tokio::test]
async fn test_nested_value_round_trip() {
    for driver in DRIVERS {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, driver, "profiles").await;

        let stored = store.set_item("ada", profile()).await.unwrap();
        assert_eq!(stored, profile(), "{driver}");
        assert_eq!(
            store.get_item("ada").await.unwrap(),
            Some(profile()),
            "{driver}"
        );
    }
}

#[tokio::test]
async fn test_falsy_values_are_not_missing() {
    for driver in DRIVERS {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, driver, "falsy").await;

        let values = [
            Value::Bool(false),
            Value::Integer(0),
            Value::from(""),
            Value::Null,
            Value::Blob(Vec::new()),
            Value::Array(Vec::new()),
            Value::Object(Vec::new()),
        ];
        for (i, value) in values.iter().enumerate() {
            let _ = store.set_item(format!("k{i}"), value.clone());
        }
        for (i, value) in values.iter().enumerate() {
            assert_eq!(
                store.get_item(format!("k{i}")).await.unwrap().as_ref(),
                Some(value),
                "{driver}: k{i}"
            );
        }
        assert_eq!(store.get_item("missing").await.unwrap(), None, "{driver}");
    }
}

#[tokio::test]
async fn test_non_finite_float_rejected() {
    for driver in DRIVERS {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, driver, "floats").await;

        let err = store.set_item("nan", f64::NAN).await.unwrap_err();
        assert!(matches!(err, Error::Serialization(_)), "{driver}: {err}");
        assert_eq!(store.length().await.unwrap(), 0, "{driver}");
    }
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_over_deep_value_rejected_on_write() {
    let deep = (0..=unikv::serializer::MAX_NESTING)
        .fold(Value::Null, |inner, _| Value::Array(vec![inner]));

    for driver in DRIVERS {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, driver, "deep").await;

        let err = store.set_item("k", deep.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Serialization(_)), "{driver}: {err}");
        assert_eq!(store.get_item("k").await.unwrap(), None, "{driver}");
    }
}

#[tokio::test]
async fn test_data_survives_store_recreation() {
    for driver in DRIVERS {
        let tmp = TempDir::new().unwrap();
        {
            let store = open(&tmp, driver, "durable").await;
            store.set_item("a", 1).await.unwrap();
            store.set_item("b", profile()).await.unwrap();
        }

        let store = open(&tmp, driver, "durable").await;
        assert_eq!(store.keys().await.unwrap(), vec!["a", "b"], "{driver}");
        assert_eq!(
            store.get_item("b").await.unwrap(),
            Some(profile()),
            "{driver}"
        );
    }
}

#[tokio::test]
async fn test_default_driver_reopens_same_data() {
    let tmp = TempDir::new().unwrap();
    let config = StoreConfig::new("default").with_data_dir(tmp.path());

    let first = Store::new(config.clone()).unwrap();
    first.set_item("k", "v").await.unwrap();
    let chosen = first.driver().unwrap();
    drop(first);

    let second = Store::new(config).unwrap();
    assert_eq!(second.ready().await.unwrap(), chosen);
    assert_eq!(second.get_item("k").await.unwrap(), Some(Value::from("v")));
}

// =============================================================================
// Namespaces
// =============================================================================

#[tokio::test]
async fn test_clear_only_touches_own_store() {
    for driver in DRIVERS {
        let tmp = TempDir::new().unwrap();
        let users = open(&tmp, driver, "users").await;
        let sessions = open(&tmp, driver, "sessions").await;

        let _ = users.set_item("u1", "alice");
        let _ = sessions.set_item("s1", "token");
        users.clear().await.unwrap();

        assert_eq!(users.length().await.unwrap(), 0, "{driver}");
        assert_eq!(
            sessions.get_item("s1").await.unwrap(),
            Some(Value::from("token")),
            "{driver}"
        );
    }
}

#[tokio::test]
async fn test_store_name_outside_charset_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = StoreConfig::new("app")
        .with_store_name("user-prefs")
        .with_data_dir(tmp.path());
    assert!(matches!(Store::new(config), Err(Error::Config(_))));
}

async fn open_named(tmp: &TempDir, driver: &str, name: &str, store: &str) -> Store {
    let config = StoreConfig::new(name)
        .with_store_name(store)
        .with_data_dir(tmp.path());
    let s = Store::new(config).unwrap();
    assert_eq!(s.set_driver([driver]).await.unwrap(), driver);
    s
}

#[tokio::test]
async fn test_lookalike_names_stay_isolated() {
    let pairs = [
        (("my app", "s"), ("my_app", "s")),
        (("my app", "s"), ("my%20app", "s")),
        (("a", "b"), ("a/b", "c")),
        (("app", "user_prefs"), ("app", "userprefs")),
    ];

    for driver in DRIVERS {
        for ((name_a, store_a), (name_b, store_b)) in pairs {
            let tmp = TempDir::new().unwrap();
            let a = open_named(&tmp, driver, name_a, store_a).await;
            let b = open_named(&tmp, driver, name_b, store_b).await;
            let case = format!("{driver}: {name_a}/{store_a} vs {name_b}/{store_b}");

            let _ = a.set_item("x", "from a");
            b.set_item("x", "from b").await.unwrap();
            assert_eq!(a.keys().await.unwrap(), vec!["x"], "{case}");
            assert_eq!(b.keys().await.unwrap(), vec!["x"], "{case}");
            assert_eq!(a.get_item("x").await.unwrap(), Some(Value::from("from a")), "{case}");

            a.clear().await.unwrap();
            assert_eq!(b.get_item("x").await.unwrap(), Some(Value::from("from b")), "{case}");

            b.drop_instance().await.unwrap();
            a.set_item("y", 1).await.unwrap();
            assert_eq!(a.length().await.unwrap(), 1, "{case}");
        }
    }
}

#[tokio::test]
async fn test_drop_instance_then_write_again() {
    for driver in DRIVERS {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, driver, "ephemeral").await;

        let _ = store.set_item("k", 1);
        store.drop_instance().await.unwrap();
        assert_eq!(store.length().await.unwrap(), 0, "{driver}");

        store.set_item("k", 2).await.unwrap();
        assert_eq!(
            store.get_item("k").await.unwrap(),
            Some(Value::from(2)),
            "{driver}"
        );
    }
}

// =============================================================================
// Iteration
// =============================================================================

#[tokio::test]
async fn test_iterate_matches_keys_order() {
    for driver in DRIVERS {
        let tmp = TempDir::new().unwrap();
        let store = open(&tmp, driver, "walk").await;

        for key in ["zebra", "apple", "mango"] {
            let _ = store.set_item(key, key.len() as i64);
        }
        // Overwriting keeps the original position.
        let _ = store.set_item("zebra", 0);

        let collected = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = collected.clone();
        store
            .iterate(move |key, _, n| {
                sink.lock().push((n, key));
                None::<()>
            })
            .await
            .unwrap();

        let keys = store.keys().await.unwrap();
        let walked: Vec<String> = collected.lock().iter().map(|(_, k)| k.clone()).collect();
        assert_eq!(walked, keys, "{driver}");
        assert_eq!(keys, vec!["zebra", "apple", "mango"], "{driver}");
        assert_eq!(
            collected.lock().iter().map(|(n, _)| *n).collect::<Vec<_>>(),
            vec![1, 2, 3],
            "{driver}"
        );
    }
}

// =============================================================================
// Quotas
// =============================================================================

#[tokio::test]
async fn test_local_storage_quota() {
    let tmp = TempDir::new().unwrap();
    let config = StoreConfig::new("quota")
        .with_data_dir(tmp.path())
        .with_local_quota(1024)
        .with_driver_order([LOCAL_STORAGE]);
    let store = Store::new(config).unwrap();

    store.set_item("small", "fits").await.unwrap();
    let err = store
        .set_item("large", Value::Blob(vec![7; 4096]))
        .await
        .unwrap_err();
    assert_eq!(err.backend_kind(), Some(BackendErrorKind::QuotaExceeded));

    // The failed write leaves earlier data intact and the store usable.
    assert_eq!(store.keys().await.unwrap(), vec!["small"]);
    store.set_item("another", 1).await.unwrap();
}
