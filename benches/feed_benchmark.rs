use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use futures_util::future::join_all;
use stock_dashboard::logging;
use stock_dashboard::model::Ticker;
use stock_dashboard::simulator::SimulatorState;
use stock_dashboard::store::memory::MemoryStore;
use stock_dashboard::store::{DocumentStore, StorePaths};
use stock_dashboard::sync::fold_price_snapshot;
use tokio::runtime::Runtime;

fn bench_price_walk(c: &mut Criterion) {
    logging::set_silent(true);

    let mut group = c.benchmark_group("price_walk");
    group.throughput(Throughput::Elements(Ticker::ALL.len() as u64));
    group.bench_function("advance", |b| {
        let mut state = SimulatorState::with_seed(0xBADF00D);
        b.iter(|| state.advance());
    });
    group.finish();
}

fn bench_snapshot_fold(c: &mut Criterion) {
    logging::set_silent(true);
    let rt = Runtime::new().expect("failed to create Tokio runtime");

    // A realistic full-roster snapshot, produced through the store itself.
    let snapshot = rt.block_on(async {
        let store = MemoryStore::new();
        let paths = StorePaths::new("bench-app");
        let mut state = SimulatorState::with_seed(7);
        for update in state.advance() {
            store
                .write(&paths.price_document(update.ticker), update.write_fields())
                .await
                .expect("write");
        }
        let mut feed = store
            .subscribe(&paths.prices_collection())
            .await
            .expect("subscribe");
        feed.recv().await.expect("snapshot")
    });

    let mut group = c.benchmark_group("snapshot_fold");
    group.throughput(Throughput::Elements(snapshot.len() as u64));
    group.bench_function("fold_price_snapshot", |b| {
        b.iter(|| fold_price_snapshot(&snapshot));
    });
    group.finish();
}

fn bench_tick_write_cycle(c: &mut Criterion) {
    logging::set_silent(true);
    let rt = Runtime::new().expect("failed to create Tokio runtime");
    let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
    let paths = StorePaths::new("bench-app");

    let mut group = c.benchmark_group("tick_write_cycle");
    group.throughput(Throughput::Elements(Ticker::ALL.len() as u64));
    group.bench_function("advance_and_write", |b| {
        let mut state = SimulatorState::with_seed(11);
        b.iter(|| {
            rt.block_on(async {
                let updates = state.advance();
                let writes = updates.iter().map(|update| {
                    let path = paths.price_document(update.ticker);
                    let fields = update.write_fields();
                    let store = Arc::clone(&store);
                    async move { store.write(&path, fields).await }
                });
                for result in join_all(writes).await {
                    result.expect("write");
                }
            });
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_price_walk,
    bench_snapshot_fold,
    bench_tick_write_cycle
);
criterion_main!(benches);
