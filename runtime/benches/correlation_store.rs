//! Benchmarks for the correlation store and a full in-memory round trip.
//!
//! Run with: `cargo bench --bench correlation_store`

#![allow(missing_docs)]
#![allow(clippy::expect_used)]

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::time::Duration;
use syncbridge_core::{Message, MessageIdCorrelator};
use syncbridge_runtime::{CorrelationStore, InMemoryChannel, SyncConsumer, SyncProducer};

/// Benchmark buffered store followed by an immediate find
fn benchmark_store_then_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlation_store");
    group.throughput(Throughput::Elements(1));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    group.bench_function("store_then_find", |b| {
        let store = Arc::new(CorrelationStore::new());
        let mut i = 0_u64;

        b.to_async(&runtime).iter(|| {
            i += 1;
            let key = format!("key-{i}");
            store.store(key.clone(), black_box(i));
            let store = Arc::clone(&store);
            async move {
                let _ = store.find(&key, Duration::from_secs(1)).await;
            }
        });
    });

    group.bench_function("find_then_store", |b| {
        let store = Arc::new(CorrelationStore::new());
        let mut i = 0_u64;

        b.to_async(&runtime).iter(|| {
            i += 1;
            let key = format!("key-{i}");
            let store = Arc::clone(&store);
            async move {
                let waiter = {
                    let store = Arc::clone(&store);
                    let key = key.clone();
                    tokio::spawn(async move { store.find(&key, Duration::from_secs(1)).await })
                };
                store.store(key, black_box(i));
                let _ = waiter.await;
            }
        });
    });

    group.finish();
}

/// Benchmark a request/reply round trip over in-memory channels
fn benchmark_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("round_trip");
    group.throughput(Throughput::Elements(1));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    group.bench_function("in_memory", |b| {
        let requests = InMemoryChannel::shared("requests");
        let replies = InMemoryChannel::shared("replies");
        let producer = SyncProducer::builder("bench-client", requests.clone())
            .reply_channel(replies)
            .poll_interval(Duration::from_millis(10))
            .build();
        let consumer = Arc::new(
            SyncConsumer::builder("bench-server", requests)
                .correlator(Arc::new(MessageIdCorrelator))
                .build(),
        );

        let responder = Arc::clone(&consumer);
        runtime.spawn(async move {
            loop {
                if let Ok(request) = responder.receive(Duration::from_millis(10)).await {
                    let _ = responder.send(Message::reply_for(&request, "pong")).await;
                }
            }
        });

        b.to_async(&runtime).iter(|| async {
            let _ = producer
                .send(black_box(Message::new("ping")), Duration::from_secs(1))
                .await;
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_store_then_find, benchmark_round_trip);
criterion_main!(benches);
