//! Throughput benchmarks for the serializer and the built-in drivers.
//!
//! Benchmarks:
//! - Text and binary encoding of a mixed value
//! - `set_item` + `get_item` round trips through a `Store`, per driver
//!
//! Run with:
//! ```bash
//! cargo bench --bench store_throughput
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::time::Duration;
use tempfile::TempDir;
use unikv::drivers::{LOCAL_STORAGE, REDB, SQLITE};
use unikv::{Store, StoreConfig, Value, serializer};

fn sample(blob_len: usize) -> Value {
    Value::Object(vec![
        ("id".into(), Value::from(42)),
        ("title".into(), Value::from("benchmark record")),
        ("ratio".into(), Value::from(0.75)),
        ("payload".into(), Value::Blob(vec![0xAB; blob_len])),
        (
            "tags".into(),
            Value::Array(vec![Value::from("a"), Value::from("b")]),
        ),
    ])
}

fn serializer_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("serializer");

    for blob_len in [0usize, 1024, 64 * 1024] {
        let value = sample(blob_len);
        group.throughput(Throughput::Bytes(blob_len as u64));

        group.bench_with_input(BenchmarkId::new("to_text", blob_len), &value, |b, v| {
            b.iter(|| serializer::to_text(black_box(v)));
        });

        let text = serializer::to_text(&value).unwrap();
        group.bench_with_input(BenchmarkId::new("from_text", blob_len), &text, |b, t| {
            b.iter(|| serializer::from_text(black_box(t)));
        });

        group.bench_with_input(BenchmarkId::new("to_bytes", blob_len), &value, |b, v| {
            b.iter(|| serializer::to_bytes(black_box(v)));
        });
    }

    group.finish();
}

fn driver_benchmarks(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("drivers");
    group.measurement_time(Duration::from_secs(5));
    group.sample_size(30);

    for driver in [REDB, SQLITE, LOCAL_STORAGE] {
        let tmp = TempDir::new().unwrap();
        let store = rt.block_on(async {
            let config = StoreConfig::new("bench").with_data_dir(tmp.path());
            let store = Store::new(config).unwrap();
            store.set_driver([driver]).await.unwrap();
            store
        });
        let value = sample(256);

        group.throughput(Throughput::Elements(1));
        group.bench_function(BenchmarkId::new("set_get", driver), |b| {
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                let key = format!("key_{}", i % 100);
                rt.block_on(async {
                    store.set_item(key.clone(), value.clone()).await.unwrap();
                    black_box(store.get_item(key).await.unwrap());
                });
            });
        });
    }

    group.finish();
}

criterion_group!(benches, serializer_benchmarks, driver_benchmarks);
criterion_main!(benches);
