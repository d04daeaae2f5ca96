//! Micro-benchmarks for constdb core operations.
//!
//! Uses Criterion for statistically rigorous measurement with regression
//! detection and HTML reports.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench micro              # run all micro-benchmarks
//! cargo bench --bench micro -- lookup    # filter by name
//! ```
//!
//! Reports are generated in `target/criterion/report/index.html`.

use criterion::{
    BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};

use constdb::{Cdb, CdbConfig, CdbWriter};
use std::io::Cursor;
use tempfile::TempDir;

// ------------------------------------------------------------------------------------------------
// Helpers
// ------------------------------------------------------------------------------------------------

/// Default value payload for benchmarks (128 bytes).
const VALUE_128B: &[u8; 128] = &[0xAB; 128];

/// Larger value payload (1 KiB).
const VALUE_1K: &[u8; 1024] = &[0xCD; 1024];

/// Format a zero-padded key.
fn make_key(i: u64) -> Vec<u8> {
    format!("key-{i:012}").into_bytes()
}

/// Build a database file with `count` sequential keys and open it.
fn prepopulate(dir: &TempDir, count: u64, value: &[u8]) -> Cdb {
    let path = dir.path().join("bench.cdb");
    let entries = (0..count).map(|i| (make_key(i), value.to_vec()));
    Cdb::build(&path, CdbConfig::default(), entries).expect("build");
    Cdb::open(&path).expect("open")
}

// ================================================================================================
// Build benchmarks
// ================================================================================================

/// Benchmark group for database construction.
///
/// # Sub-benchmarks
///
/// ## `in_memory/1000` … `in_memory/100000`
///
/// **Scenario:** Streams N records through a `CdbWriter` into an in-memory
/// sink and finalizes the index.
///
/// **What it measures:** The pure build cost — record framing, hashing,
/// bucket accounting, and index finalization — without filesystem noise.
/// Throughput is reported in records per second.
fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    for count in [1_000u64, 10_000, 100_000] {
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("in_memory", count), &count, |b, &count| {
            b.iter_batched(
                || (0..count).map(make_key).collect::<Vec<_>>(),
                |keys| {
                    let mut writer =
                        CdbWriter::new(Cursor::new(Vec::new()), CdbConfig::default()).unwrap();
                    for key in &keys {
                        writer.add(key, VALUE_128B).unwrap();
                    }
                    black_box(writer.finalize().unwrap())
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

// ================================================================================================
// Lookup benchmarks
// ================================================================================================

/// Benchmark group for point lookups against a memory-mapped file.
///
/// # Sub-benchmarks
///
/// ## `hit/128B` and `hit/1K`
///
/// **Scenario:** Looks up keys that exist in a 100k-record database, two
/// payload sizes.
///
/// **What it measures:** The full lookup path — hash, header read, slot
/// probes, key compare, value copy — including how value size affects the
/// copy-out cost.
///
/// ## `miss`
///
/// **Scenario:** Looks up keys that were never stored.
///
/// **What it measures:** The cost of a negative answer: probe until an
/// empty slot, no record reads in the common case.
fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");
    group.throughput(Throughput::Elements(1));

    for (label, value) in [("128B", &VALUE_128B[..]), ("1K", &VALUE_1K[..])] {
        let dir = TempDir::new().unwrap();
        let db = prepopulate(&dir, 100_000, value);
        let mut i = 0u64;
        group.bench_function(BenchmarkId::new("hit", label), |b| {
            b.iter(|| {
                let key = make_key(i % 100_000);
                i = i.wrapping_add(7919);
                black_box(db.get(&key).unwrap())
            });
        });
    }

    let dir = TempDir::new().unwrap();
    let db = prepopulate(&dir, 100_000, VALUE_128B);
    let mut i = 0u64;
    group.bench_function("miss", |b| {
        b.iter(|| {
            let key = make_key(100_000 + (i % 100_000));
            i = i.wrapping_add(7919);
            black_box(db.get(&key).unwrap())
        });
    });

    group.finish();
}

// ================================================================================================
// Scan benchmarks
// ================================================================================================

/// Benchmark group for sequential iteration.
///
/// # Sub-benchmarks
///
/// ## `full/10000`
///
/// **Scenario:** Scans every record of a 10k-record database.
///
/// **What it measures:** Per-record decode and copy cost of the data
/// region walk, independent of the hash index.
fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    let count = 10_000u64;
    group.throughput(Throughput::Elements(count));

    let dir = TempDir::new().unwrap();
    let db = prepopulate(&dir, count, VALUE_128B);
    group.bench_with_input(BenchmarkId::new("full", count), &count, |b, &count| {
        b.iter(|| {
            let mut records = 0u64;
            for record in db.iter() {
                black_box(record.unwrap());
                records += 1;
            }
            assert_eq!(records, count);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_build, bench_lookup, bench_scan);
criterion_main!(benches);
