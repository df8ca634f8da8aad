//! Performance benchmarks for the state store.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use streamstate::{
    BinaryRow, FieldType, FieldValue, FileStateStoreProvider, RowWriter, StateStoreConfig,
    StateStoreId, StateStoreProvider,
};
use tempfile::TempDir;

fn key(i: i64) -> BinaryRow {
    RowWriter::from_values(&[FieldValue::Str(format!("user-{}", i)), FieldValue::Int(0)])
}

fn value(i: i64) -> BinaryRow {
    RowWriter::from_values(&[FieldValue::Long(i)])
}

fn open_provider(dir: &TempDir, min_deltas_for_snapshot: usize) -> FileStateStoreProvider {
    FileStateStoreProvider::open(StateStoreConfig {
        checkpoint_root: dir.path().to_path_buf(),
        id: StateStoreId {
            operator_id: 1,
            partition_id: 0,
        },
        key_schema: vec![FieldType::Str, FieldType::Int],
        value_schema: vec![FieldType::Long],
        min_deltas_for_snapshot,
        min_versions_to_retain: 10_000,
        num_versions_to_retain_in_memory: 1,
        ..Default::default()
    })
    .unwrap()
}

/// Benchmark row encoding through the writer
fn bench_row_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_encoding");

    group.bench_function("write_mixed_row", |b| {
        b.iter(|| {
            black_box(RowWriter::from_values(&[
                FieldValue::Str("user-123456".into()),
                FieldValue::Int(42),
                FieldValue::Long(9_876_543_210),
                FieldValue::Double(3.5),
                FieldValue::Bytes(vec![0xAB; 32]),
            ]));
        });
    });

    group.bench_function("update_inline_str", |b| {
        let mut row = RowWriter::from_values(&[
            FieldValue::Long(1),
            FieldValue::Str("initial payload text".into()),
        ]);
        b.iter(|| {
            row.update(1, FieldValue::Str(black_box("shorter text".into())));
        });
    });

    group.finish();
}

/// Benchmark version reconstruction with varying delta chain depths
fn bench_version_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("version_load");
    group.sample_size(20);

    for chain_depth in [10, 50, 200] {
        group.bench_with_input(
            BenchmarkId::new("delta_chain", chain_depth),
            &chain_depth,
            |b, &depth| {
                let dir = TempDir::new().unwrap();
                // Snapshot threshold above the chain depth: loads replay
                // the full delta chain every time.
                let provider = open_provider(&dir, depth as usize + 1);

                for v in 0..depth {
                    let mut store = provider.get_store(v).unwrap();
                    store.put(key(v as i64), value(v as i64)).unwrap();
                    store.commit().unwrap();
                }

                // The cache holds one version; alternating two versions
                // evicts on every read and forces a rebuild from files.
                let mut flip = false;
                b.iter(|| {
                    flip = !flip;
                    let v = if flip { depth - 1 } else { depth - 2 };
                    black_box(provider.get_read_only(v).unwrap());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark version reconstruction when a snapshot bounds the replay
fn bench_version_load_with_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("version_load_with_snapshot");
    group.sample_size(20);
    let depth = 200u64;

    for snapshot_every in [20, 50, 100] {
        group.bench_with_input(
            BenchmarkId::new("snapshot_every", snapshot_every),
            &snapshot_every,
            |b, &snap_freq| {
                let dir = TempDir::new().unwrap();
                let provider = open_provider(&dir, snap_freq as usize);

                for v in 0..depth {
                    let mut store = provider.get_store(v).unwrap();
                    store.put(key(v as i64), value(v as i64)).unwrap();
                    store.commit().unwrap();
                    if (v + 1) % snap_freq == 0 {
                        provider.do_maintenance().unwrap();
                    }
                }

                let mut flip = false;
                b.iter(|| {
                    flip = !flip;
                    let v = if flip { depth - 1 } else { depth - 2 };
                    black_box(provider.get_read_only(v).unwrap());
                });
            },
        );
    }

    group.finish();
}

/// Benchmark commit throughput with varying batch sizes
fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");
    group.sample_size(20);

    for batch_size in [10, 100, 1000] {
        group.bench_with_input(
            BenchmarkId::new("batch_size", batch_size),
            &batch_size,
            |b, &size| {
                let dir = TempDir::new().unwrap();
                let provider = open_provider(&dir, usize::MAX);

                b.iter(|| {
                    let version = provider.latest_version();
                    let mut store = provider.get_store(version).unwrap();
                    for i in 0..size {
                        store.put(key(i), value(i)).unwrap();
                    }
                    black_box(store.commit().unwrap());
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_row_encoding,
    bench_version_load,
    bench_version_load_with_snapshot,
    bench_commit
);
criterion_main!(benches);
