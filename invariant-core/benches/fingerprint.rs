use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use invariant_core::codec::{decode, encode, DomainRegistry};
use invariant_core::hash::fingerprint;
use invariant_core::value::Value;

fn sample_manifest(width: usize) -> BTreeMap<String, Value> {
    let mut manifest = BTreeMap::new();
    for i in 0..width {
        let mut inner = BTreeMap::new();
        inner.insert("index".to_string(), Value::Int(i as i64));
        inner.insert(
            "label".to_string(),
            Value::Str(format!("vertex-{i:04}")),
        );
        inner.insert(
            "coords".to_string(),
            Value::Tup(vec![Value::Int(i as i64), Value::Int((i * i) as i64)]),
        );
        manifest.insert(format!("param_{i:04}"), Value::Map(inner));
    }
    manifest
}

fn bench_fingerprint(c: &mut Criterion) {
    let manifest = sample_manifest(64);
    c.bench_function("fingerprint_64_params", |b| {
        b.iter(|| fingerprint(black_box(&manifest)))
    });
}

fn bench_codec(c: &mut Criterion) {
    let value = Value::Map(sample_manifest(64));
    c.bench_function("encode_64_params", |b| b.iter(|| encode(black_box(&value))));

    let bytes = encode(&value);
    let domains = DomainRegistry::new();
    c.bench_function("decode_64_params", |b| {
        b.iter(|| decode(black_box(&bytes), &domains).unwrap())
    });
}

criterion_group!(benches, bench_fingerprint, bench_codec);
criterion_main!(benches);
