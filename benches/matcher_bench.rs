//! Benchmarks for wildcard pattern lookup.
//!
//! Measures how quickly a query name is matched against the record table.

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, black_box};

use dnschef::matcher::{DomainMatcher, ratio};
use dnschef::record::{RecordType, RecordValue};
use dnschef::store::RecordStore;

fn populated_matcher(extra: usize) -> DomainMatcher {
    let store = Arc::new(RecordStore::new());
    store.insert(RecordType::A, "*", RecordValue::literal("192.0.2.1"));
    store.insert(RecordType::A, "*.thesprawl.org", RecordValue::literal("1.1.1.1"));
    store.insert(RecordType::A, "test.thesprawl.org", RecordValue::literal("100.100.100.100"));
    store.insert(RecordType::A, "*.*.thesprawl.org", RecordValue::literal("127.0.0.1"));
    store.insert(RecordType::A, "*.bad.thesprawl.org", RecordValue::literal("1.1.1.2"));
    store.insert(RecordType::A, "example.com", RecordValue::Disabled);

    for i in 0..extra {
        store.insert(RecordType::A, &format!("host{i}.*.corp{i}.net"), RecordValue::literal("10.0.0.1"));
    }

    DomainMatcher::new(store)
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("matcher");
    group.throughput(Throughput::Elements(1));

    for size in [0, 100, 1000] {
        let matcher = populated_matcher(size);

        // Literal pattern beats the wildcards
        group.bench_function(BenchmarkId::new("exact_match", size), |b| {
            b.iter(|| matcher.lookup(black_box("test.thesprawl.org"), RecordType::A))
        });

        // Two wildcards compete on similarity
        group.bench_function(BenchmarkId::new("wildcard_tie_break", size), |b| {
            b.iter(|| matcher.lookup(black_box("not.bad.thesprawl.org"), RecordType::A))
        });

        // Only the catch-all applies
        group.bench_function(BenchmarkId::new("catch_all", size), |b| {
            b.iter(|| matcher.lookup(black_box("a.b.c.d.e.f.example.org"), RecordType::A))
        });

        // Disabled entry wins, nothing returned
        group.bench_function(BenchmarkId::new("disabled", size), |b| {
            b.iter(|| matcher.lookup(black_box("example.com"), RecordType::A))
        });
    }

    group.finish();
}

fn bench_ratio(c: &mut Criterion) {
    let mut group = c.benchmark_group("similarity");

    group.bench_function("short", |b| {
        b.iter(|| ratio(black_box("*.thesprawl.org"), black_box("www.thesprawl.org")))
    });
    group.bench_function("long", |b| {
        b.iter(|| {
            ratio(
                black_box("*.*.cdn.static.assets.example-content-delivery.net"),
                black_box("img7.eu-west.cdn.static.assets.example-content-delivery.net"),
            )
        })
    });

    group.finish();
}

fn main() {
    let mut criterion = Criterion::default().configure_from_args();
    bench_lookup(&mut criterion);
    bench_ratio(&mut criterion);
    criterion.final_summary();
}
