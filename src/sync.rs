//! Live synchronization bindings: fold collection snapshots into typed
//! caches and republish them on watch channels for the rest of the app.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tokio::sync::watch;

use crate::logging;
use crate::metrics::{MetricsEvent, MetricsTx};
use crate::model::{PriceBook, PriceRecord, SessionIdentity, SubscribedSet};
use crate::store::{CollectionSnapshot, DocumentStore, StorePaths, SubscriptionLapse};

/// Folds a price-collection snapshot into a ticker keyed book. Records are
/// keyed by their `ticker` field rather than the document id, and documents
/// that do not parse as price records are skipped.
pub fn fold_price_snapshot(snapshot: &CollectionSnapshot) -> PriceBook {
    let mut book = PriceBook::new();
    for doc in &snapshot.docs {
        match serde_json::from_value::<PriceRecord>(doc.fields.clone()) {
            Ok(record) => {
                book.insert(record.ticker, record);
            }
            Err(err) => {
                logging::debug(
                    "prices.feed.skipped",
                    "Skipping unparseable price document",
                    json!({ "doc": doc.id, "error": err.to_string() }),
                );
            }
        }
    }
    book
}

/// Derives the subscribed set purely from document ids; ids outside the
/// ticker roster are dropped, so the set stays within the enumeration.
pub fn fold_subscription_snapshot(snapshot: &CollectionSnapshot) -> SubscribedSet {
    snapshot
        .docs
        .iter()
        .filter_map(|doc| doc.id.parse().ok())
        .collect()
}

/// Binds the shared price collection once and replaces the whole local book
/// on every snapshot. Lapses are logged and the book keeps its last good
/// value; no resubscription is attempted here.
pub async fn run_price_feed(
    store: Arc<dyn DocumentStore>,
    paths: StorePaths,
    prices_tx: watch::Sender<PriceBook>,
    mut shutdown: watch::Receiver<bool>,
    metrics: MetricsTx,
) -> Result<()> {
    let collection = paths.prices_collection();
    let mut subscription = match store.subscribe(&collection).await {
        Ok(subscription) => subscription,
        Err(err) => {
            logging::error(
                "prices.feed.error",
                "Failed to open the price feed",
                json!({ "collection": collection.as_str(), "error": err.to_string() }),
            );
            return Ok(());
        }
    };
    logging::info(
        "prices.feed.bind",
        "Price feed bound",
        json!({ "collection": collection.as_str() }),
    );

    loop {
        tokio::select! {
            result = subscription.recv() => {
                match result {
                    Ok(snapshot) => {
                        metrics.report(MetricsEvent::PriceSnapshot { documents: snapshot.len() });
                        let _ = prices_tx.send(fold_price_snapshot(&snapshot));
                    }
                    Err(SubscriptionLapse::Lagged(skipped)) => {
                        logging::warn(
                            "prices.feed.lagged",
                            "Price feed lagged snapshots",
                            json!({ "skipped": skipped }),
                        );
                        metrics.report(MetricsEvent::FeedLag {
                            skipped: skipped as usize,
                            component: "prices",
                        });
                    }
                    Err(SubscriptionLapse::Closed) => {
                        logging::warn_simple(
                            "prices.feed.closed",
                            "Price feed closed; book frozen at last value",
                        );
                        break;
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    logging::info_simple("prices.feed.stop", "Price feed stopped");
    Ok(())
}

/// Mirrors the per-user subscription collection while a concrete session
/// exists. Every session change tears the listener down and rebinds under
/// the new uid; without a concrete session the set is forced empty rather
/// than left stale.
pub async fn run_subscription_feed(
    store: Arc<dyn DocumentStore>,
    paths: StorePaths,
    mut session_rx: watch::Receiver<Option<SessionIdentity>>,
    subscribed_tx: watch::Sender<SubscribedSet>,
    mut shutdown: watch::Receiver<bool>,
    metrics: MetricsTx,
) -> Result<()> {
    'session: loop {
        let concrete = session_rx
            .borrow_and_update()
            .clone()
            .filter(|session| !session.anonymous);

        let identity = match concrete {
            Some(identity) => identity,
            None => {
                let _ = subscribed_tx.send(SubscribedSet::new());
                if !wait_for_session_change(&mut session_rx, &mut shutdown).await {
                    break 'session;
                }
                continue 'session;
            }
        };

        let collection = paths.subscriptions_collection(&identity.uid);
        let mut subscription = match store.subscribe(&collection).await {
            Ok(subscription) => subscription,
            Err(err) => {
                logging::error(
                    "subs.feed.error",
                    "Failed to open the subscription feed",
                    json!({ "collection": collection.as_str(), "error": err.to_string() }),
                );
                if !wait_for_session_change(&mut session_rx, &mut shutdown).await {
                    break 'session;
                }
                continue 'session;
            }
        };
        logging::info(
            "subs.feed.bind",
            "Subscription feed bound",
            json!({ "uid": identity.uid, "collection": collection.as_str() }),
        );

        loop {
            tokio::select! {
                result = subscription.recv() => {
                    match result {
                        Ok(snapshot) => {
                            metrics.report(MetricsEvent::SubscriptionSnapshot {
                                documents: snapshot.len(),
                            });
                            let _ = subscribed_tx.send(fold_subscription_snapshot(&snapshot));
                        }
                        Err(SubscriptionLapse::Lagged(skipped)) => {
                            logging::warn(
                                "subs.feed.lagged",
                                "Subscription feed lagged snapshots",
                                json!({ "skipped": skipped }),
                            );
                            metrics.report(MetricsEvent::FeedLag {
                                skipped: skipped as usize,
                                component: "subscriptions",
                            });
                        }
                        Err(SubscriptionLapse::Closed) => {
                            logging::warn_simple(
                                "subs.feed.closed",
                                "Subscription feed closed; waiting for a session change",
                            );
                            if !wait_for_session_change(&mut session_rx, &mut shutdown).await {
                                break 'session;
                            }
                            continue 'session;
                        }
                    }
                }
                // Dropping the subscription on rebind unregisters the listener.
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        break 'session;
                    }
                    logging::info_simple("subs.feed.rebind", "Session changed; rebinding subscription feed");
                    continue 'session;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break 'session;
                    }
                }
            }
        }
    }

    logging::info_simple("subs.feed.stop", "Subscription feed stopped");
    Ok(())
}

/// Parks until the session changes. Returns `false` when the feed should
/// stop instead of rebinding.
async fn wait_for_session_change(
    session_rx: &mut watch::Receiver<Option<SessionIdentity>>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        tokio::select! {
            changed = session_rx.changed() => return changed.is_ok(),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return false;
                }
            }
        }
    }
}
