use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fixedtree::Engine;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Creates a fresh, initialized engine backed by a file under `target/`.
/// Each benchmark iteration gets its own file to keep runs independent.
fn create_engine() -> (Engine, PathBuf) {
    let counter = COUNTER.fetch_add(1, Ordering::SeqCst);
    let file_path = PathBuf::from(format!("target/bench_db_{}.bin", counter));
    let _ = std::fs::remove_file(&file_path);

    let mut engine = Engine::open(&file_path).expect("failed to open engine");
    engine.initialize().expect("failed to initialize root");
    (engine, file_path)
}

/// Measures insertion latency once the tree already holds `num_keys - 1`
/// entries, showing how cost changes as the tree grows.
fn bench_insertion_at_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("insertion_at_size");
    group.sample_size(10);

    let key_counts = vec![1_000, 2_000, 3_000, 5_000, 10_000, 25_000];

    for &num_keys in &key_counts {
        group.bench_with_input(
            BenchmarkId::new("insert_into_tree", num_keys),
            &num_keys,
            |b, &num_keys| {
                b.iter_with_setup(
                    || {
                        let (mut engine, file_path) = create_engine();
                        for key in 0..(num_keys - 1) {
                            let value = format!("value_{}", key);
                            engine
                                .insert(key, value.as_bytes())
                                .expect("failed to insert during setup");
                        }
                        (engine, file_path)
                    },
                    |(mut engine, _file_path)| {
                        let key = num_keys - 1;
                        let value = format!("value_{}", key);
                        engine
                            .insert(black_box(key), black_box(value.as_bytes()))
                            .expect("failed to insert during benchmark");
                        black_box(&mut engine);
                    },
                );
            },
        );
    }

    group.finish();
}

/// Measures the time to insert keys one by one from an empty tree.
fn bench_sequential_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential_insertion");
    group.sample_size(10);

    let key_counts = vec![1_000, 2_500, 5_000, 10_000, 25_000, 50_000];

    for &num_keys in &key_counts {
        group.bench_with_input(
            BenchmarkId::new("sequential", num_keys),
            &num_keys,
            |b, &num_keys| {
                b.iter_with_setup(
                    create_engine,
                    |(mut engine, _file_path)| {
                        for key in 0..num_keys {
                            let value = format!("value_{}", key);
                            engine
                                .insert(black_box(key), black_box(value.as_bytes()))
                                .expect("failed to insert");
                        }
                        black_box(engine);
                    },
                );
            },
        );
    }

    group.finish();
}

/// Measures write throughput with 1KB values, reporting writes/sec.
fn bench_write_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("write_throughput");
    group.sample_size(10);

    let milestones = vec![10_000, 50_000, 100_000, 250_000];

    for &target_count in &milestones {
        group.bench_with_input(
            BenchmarkId::new("1kb_records", target_count),
            &target_count,
            |b, &target_count| {
                b.iter_with_setup(
                    create_engine,
                    |(mut engine, _file_path)| {
                        let value_1kb = vec![b'x'; 1024];

                        let start = Instant::now();
                        for key in 0..target_count {
                            engine.insert(key, &value_1kb).expect("failed to insert");
                        }
                        let elapsed = start.elapsed();

                        let writes_per_sec = target_count as f64 / elapsed.as_secs_f64();
                        eprintln!(
                            "Inserted {} records in {:?} ({:.2} writes/sec)",
                            target_count, elapsed, writes_per_sec
                        );

                        black_box(engine);
                    },
                );
            },
        );
    }

    group.finish();
}

/// Measures file size overhead relative to raw key+value bytes inserted.
fn bench_storage_efficiency(c: &mut Criterion) {
    let mut group = c.benchmark_group("storage_efficiency");
    group.sample_size(10);

    let db_sizes = vec![1_000, 10_000, 50_000, 100_000, 250_000];

    for &db_size in &db_sizes {
        group.bench_with_input(
            BenchmarkId::new("overhead", db_size),
            &db_size,
            |b, &db_size| {
                b.iter_with_setup(
                    || {
                        let (mut engine, file_path) = create_engine();
                        let value_1kb = vec![b'x'; 1024];
                        for key in 0..db_size {
                            engine.insert(key, &value_1kb).expect("failed to insert");
                        }
                        (engine, file_path)
                    },
                    |(_engine, file_path)| {
                        let key_size = 4u64;
                        let value_size = 1024u64;
                        let raw_data_size = db_size as u64 * (key_size + value_size);

                        let file_size = std::fs::metadata(&file_path)
                            .expect("failed to get file metadata")
                            .len();

                        let overhead_bytes = file_size.saturating_sub(raw_data_size);
                        let overhead_percent = if raw_data_size > 0 {
                            (overhead_bytes as f64 / raw_data_size as f64) * 100.0
                        } else {
                            0.0
                        };

                        eprintln!(
                            "Database size: {} records, raw {} bytes, file {} bytes, overhead {:.2}%",
                            db_size, raw_data_size, file_size, overhead_percent
                        );

                        black_box((raw_data_size, file_size, overhead_percent));
                    },
                );
            },
        );
    }

    group.finish();
}

/// Measures how quickly the header (and thus the root page id) reloads
/// after the engine handle is dropped and the file reopened.
fn bench_recovery_time(c: &mut Criterion) {
    let mut group = c.benchmark_group("recovery_time");
    group.sample_size(10);

    let db_sizes = vec![1_000, 10_000, 50_000, 100_000, 250_000];

    for &db_size in &db_sizes {
        group.bench_with_input(
            BenchmarkId::new("reload", db_size),
            &db_size,
            |b, &db_size| {
                b.iter_with_setup(
                    || {
                        let (mut engine, file_path) = create_engine();
                        let value_1kb = vec![b'x'; 1024];
                        for key in 0..db_size {
                            engine.insert(key, &value_1kb).expect("failed to insert");
                        }
                        engine.close().expect("failed to close");
                        file_path
                    },
                    |file_path| {
                        let start = Instant::now();
                        let engine = Engine::open(&file_path).expect("failed to recover engine");
                        let elapsed = start.elapsed();

                        black_box(&engine);
                        eprintln!(
                            "Recovery time for {} records: {:?} ({:.2} ms)",
                            db_size,
                            elapsed,
                            elapsed.as_secs_f64() * 1000.0
                        );
                    },
                );
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_insertion_at_size,
    bench_sequential_insertion,
    bench_write_throughput,
    bench_storage_efficiency,
    bench_recovery_time
);
criterion_main!(benches);
