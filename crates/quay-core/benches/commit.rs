use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use quay_core::{Message, MessageStore, StoreConfig};

fn bench_store(sync_writes: bool) -> (MessageStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        data_dir: dir.path().to_path_buf(),
        sync_writes,
        ..Default::default()
    };
    let store = MessageStore::open(&config).unwrap();
    store.create_queue("bench").unwrap();
    (store, dir)
}

fn bench_message() -> Message {
    let mut msg = Message::new("bench", vec![0u8; 256]);
    msg.destination = Some("lq.tcp://localhost:5050".to_string());
    msg
}

/// Benchmark committing batches of outgoing messages.
fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");

    for batch_size in [1usize, 10, 100] {
        let (store, _dir) = bench_store(false);
        group.bench_function(format!("store_outgoing_x{batch_size}"), |b| {
            b.iter_batched(
                || (0..batch_size).map(|_| bench_message()).collect::<Vec<_>>(),
                |batch| {
                    let mut tx = store.begin_transaction().unwrap();
                    for msg in &batch {
                        store.store_outgoing(&mut tx, msg).unwrap();
                    }
                    tx.commit().unwrap();
                },
                BatchSize::SmallInput,
            );
        });
    }

    // Durable commit cost: one fsync per transaction
    let (store, _dir) = bench_store(true);
    group.bench_function("store_outgoing_synced", |b| {
        b.iter_batched(
            bench_message,
            |msg| {
                let mut tx = store.begin_transaction().unwrap();
                store.store_outgoing(&mut tx, &msg).unwrap();
                tx.commit().unwrap();
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

/// Benchmark the retry state machine on a message that never exhausts.
fn bench_failed_to_send(c: &mut Criterion) {
    let (store, _dir) = bench_store(false);
    let msg = bench_message();
    let mut tx = store.begin_transaction().unwrap();
    store.store_outgoing(&mut tx, &msg).unwrap();
    tx.commit().unwrap();

    c.bench_function("failed_to_send", |b| {
        b.iter(|| black_box(store.failed_to_send(black_box(&msg)).unwrap()));
    });
}

criterion_group!(benches, bench_commit, bench_failed_to_send);
criterion_main!(benches);
