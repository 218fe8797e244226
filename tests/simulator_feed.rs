use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use stock_dashboard::app::testkit::wait_for;
use stock_dashboard::app::App;
use stock_dashboard::auth::memory::MemoryAuth;
use stock_dashboard::config::AppConfig;
use stock_dashboard::logging;
use stock_dashboard::metrics::MetricsTx;
use stock_dashboard::model::Ticker;
use stock_dashboard::simulator::{run_price_simulator, SimulatorConfig, SimulatorState};
use stock_dashboard::store::memory::MemoryStore;
use stock_dashboard::store::testkit::FailingStore;
use stock_dashboard::store::{DocumentStore, StorePaths};
use stock_dashboard::sync::fold_price_snapshot;

fn fast_config(max_ticks: Option<usize>) -> SimulatorConfig {
    SimulatorConfig {
        tick_interval: Duration::from_millis(5),
        max_ticks,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn simulator_populates_the_whole_price_book() {
    logging::set_silent(true);
    let store = MemoryStore::new();
    let auth = MemoryAuth::with_seed(5);
    let app = App::start_with_simulator(
        Arc::new(store),
        Arc::new(auth),
        AppConfig::default(),
        Some((fast_config(Some(20)), SimulatorState::with_seed(0xBADF00D))),
    )
    .await;

    let mut prices = app.watch_prices();
    let book = wait_for(&mut prices, |book| book.len() == Ticker::ALL.len())
        .await
        .expect("book fills up");

    for (ticker, record) in &book {
        assert_eq!(record.ticker, *ticker, "book is keyed by the ticker field");
        assert!(record.price >= 1.0, "floor holds for {ticker}");
        let previous = record
            .previous_price
            .expect("simulator always writes previousPrice");
        assert!(
            (record.price - previous).abs() <= 0.005 * previous + 0.005 + 1e-9,
            "{ticker}: {previous} -> {} exceeds the volatility bound",
            record.price
        );
        assert!(record.last_update.is_some(), "server timestamp resolved");
    }

    app.shutdown().await.expect("clean shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bounded_simulator_runs_to_its_tick_limit() {
    logging::set_silent(true);
    let store = Arc::new(MemoryStore::new());
    let paths = StorePaths::new("sim-app");
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    run_price_simulator(
        Arc::clone(&store) as Arc<dyn DocumentStore>,
        paths.clone(),
        fast_config(Some(6)),
        SimulatorState::with_seed(99),
        shutdown_rx,
        MetricsTx::noop(),
    )
    .await
    .expect("simulator run");

    let mut feed = store
        .subscribe(&paths.prices_collection())
        .await
        .expect("subscribe");
    let book = fold_price_snapshot(&feed.recv().await.expect("snapshot"));
    assert_eq!(book.len(), Ticker::ALL.len());
    for record in book.values() {
        assert!(record.price.is_finite() && record.price >= 1.0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn write_failures_do_not_stop_the_simulator() {
    logging::set_silent(true);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let run = tokio::spawn(run_price_simulator(
        Arc::new(FailingStore) as Arc<dyn DocumentStore>,
        StorePaths::new("sim-app"),
        fast_config(Some(5)),
        SimulatorState::with_seed(1),
        shutdown_rx,
        MetricsTx::noop(),
    ));

    // Runs every tick even though every write fails.
    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("finishes in time")
        .expect("join")
        .expect("failures are non-fatal");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_stops_an_unbounded_simulator() {
    logging::set_silent(true);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let run = tokio::spawn(run_price_simulator(
        Arc::new(MemoryStore::new()) as Arc<dyn DocumentStore>,
        StorePaths::new("sim-app"),
        fast_config(None),
        SimulatorState::with_seed(2),
        shutdown_rx,
        MetricsTx::noop(),
    ));

    tokio::time::sleep(Duration::from_millis(25)).await;
    shutdown_tx.send(true).expect("send shutdown");

    tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("stops promptly")
        .expect("join")
        .expect("clean stop");
}
