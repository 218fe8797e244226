use std::{collections::HashMap, time::Duration};

use anyhow::Result;
use serde_json::{json, Map, Value};
use tokio::{
    sync::{mpsc, watch},
    time::{interval, MissedTickBehavior},
};

use crate::logging;

#[derive(Debug)]
pub enum MetricsEvent {
    SimulatorBatch {
        writes: usize,
        failures: usize,
    },
    PriceSnapshot {
        documents: usize,
    },
    SubscriptionSnapshot {
        documents: usize,
    },
    FeedLag {
        skipped: usize,
        component: &'static str,
    },
}

#[derive(Clone, Default)]
pub struct MetricsTx(Option<mpsc::UnboundedSender<MetricsEvent>>);

impl MetricsTx {
    pub fn report(&self, event: MetricsEvent) {
        if let Some(sender) = &self.0 {
            let _ = sender.send(event);
        }
    }

    pub fn noop() -> Self {
        Self(None)
    }
}

pub fn reporter(
    shutdown: watch::Receiver<bool>,
) -> (MetricsTx, impl std::future::Future<Output = Result<()>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (MetricsTx(Some(tx)), process_events(rx, shutdown))
}

async fn process_events(
    mut rx: mpsc::UnboundedReceiver<MetricsEvent>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let mut simulator_batches: usize = 0;
    let mut simulator_writes: usize = 0;
    let mut write_failures: usize = 0;
    let mut price_snapshots: usize = 0;
    let mut price_documents: usize = 0;
    let mut subscription_snapshots: usize = 0;
    let mut subscription_documents: usize = 0;
    let mut feed_lag: HashMap<&'static str, (usize, usize)> = HashMap::new();

    let mut reporter = interval(Duration::from_secs(1));
    reporter.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(MetricsEvent::SimulatorBatch { writes, failures }) => {
                        simulator_batches = simulator_batches.saturating_add(1);
                        simulator_writes = simulator_writes.saturating_add(writes);
                        write_failures = write_failures.saturating_add(failures);
                    }
                    Some(MetricsEvent::PriceSnapshot { documents }) => {
                        price_snapshots = price_snapshots.saturating_add(1);
                        price_documents = price_documents.saturating_add(documents);
                    }
                    Some(MetricsEvent::SubscriptionSnapshot { documents }) => {
                        subscription_snapshots = subscription_snapshots.saturating_add(1);
                        subscription_documents = subscription_documents.saturating_add(documents);
                    }
                    Some(MetricsEvent::FeedLag { skipped, component }) => {
                        let entry = feed_lag.entry(component).or_insert((0, 0));
                        entry.0 = entry.0.saturating_add(1);
                        entry.1 = entry.1.saturating_add(skipped);
                    }
                    None => break,
                }
            }
            _ = reporter.tick() => {
                if simulator_batches > 0 || price_snapshots > 0 || subscription_snapshots > 0 || !feed_lag.is_empty() {
                    let lag_snapshot = if feed_lag.is_empty() {
                        Value::Null
                    } else {
                        let mut map = Map::new();
                        for (component, (events, skipped)) in &feed_lag {
                            map.insert(
                                component.to_string(),
                                json!({
                                    "events": events,
                                    "skipped": skipped
                                }),
                            );
                        }
                        Value::Object(map)
                    };

                    logging::info(
                        "metrics.summary",
                        "dashboard activity summary",
                        json!({
                            "simulator_batches": simulator_batches,
                            "simulator_writes": simulator_writes,
                            "write_failures": write_failures,
                            "price_snapshots": price_snapshots,
                            "avg_price_documents": if price_snapshots > 0 { price_documents as f64 / price_snapshots as f64 } else { 0.0 },
                            "subscription_snapshots": subscription_snapshots,
                            "subscription_documents": subscription_documents,
                            "feed_lag": lag_snapshot,
                        })
                    );
                }

                simulator_batches = 0;
                simulator_writes = 0;
                write_failures = 0;
                price_snapshots = 0;
                price_documents = 0;
                subscription_snapshots = 0;
                subscription_documents = 0;
                feed_lag.clear();
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    logging::info_simple("metrics.stop", "Metrics reporter stopped");
    Ok(())
}
