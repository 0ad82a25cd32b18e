use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

use pagestore::{PageStorage, PageStorageConfig, WriteBatch};

fn open_storage(dir: &TempDir) -> PageStorage {
    PageStorage::open("bench", dir.path(), PageStorageConfig::default(), None)
        .expect("failed to open storage")
}

// ============================================================================
// Benchmark: Write path
// ============================================================================

fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");

    for size in [128usize, 4096, 65536] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("put", size), &size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let storage = open_storage(&dir);
            let payload = vec![7u8; size];
            let mut counter = 0u64;
            b.iter(|| {
                counter += 1;
                let mut batch = WriteBatch::new();
                let mut key = b"bench/".to_vec();
                key.extend_from_slice(&counter.to_be_bytes());
                batch.put(key, payload.clone(), 0, vec![]);
                storage.write(black_box(batch), None).unwrap();
            });
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark: Read path
// ============================================================================

fn bench_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");

    for size in [128usize, 4096, 65536] {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("get", size), &size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let storage = open_storage(&dir);

            let keys: Vec<Vec<u8>> = (0..256u64)
                .map(|i| {
                    let mut key = b"bench/".to_vec();
                    key.extend_from_slice(&i.to_be_bytes());
                    key
                })
                .collect();
            for key in &keys {
                let mut batch = WriteBatch::new();
                batch.put(key.clone(), vec![9u8; size], 0, vec![]);
                storage.write(batch, None).unwrap();
            }

            let snapshot = storage.snapshot("bench");
            let mut counter = 0usize;
            b.iter(|| {
                counter = (counter + 1) % keys.len();
                let page = storage
                    .read(black_box(&keys[counter]), None, Some(&snapshot))
                    .unwrap();
                black_box(page.data.len());
            });
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark: Snapshot creation
// ============================================================================

fn bench_snapshot(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let storage = open_storage(&dir);
    for i in 0..1024u64 {
        let mut batch = WriteBatch::new();
        batch.put(i.to_be_bytes().to_vec(), vec![1; 64], 0, vec![]);
        storage.write(batch, None).unwrap();
    }

    c.bench_function("snapshot_create_drop", |b| {
        b.iter(|| {
            let snapshot = storage.snapshot("bench");
            black_box(snapshot.sequence());
        });
    });
}

criterion_group!(benches, bench_write, bench_read, bench_snapshot);
criterion_main!(benches);
