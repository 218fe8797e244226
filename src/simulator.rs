//! Random-walk price simulator. One writer task mutates the shared price
//! collection on a fixed timer; everything else observes it through the
//! store's snapshot fan-out like any other client.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures_util::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::logging;
use crate::metrics::{MetricsEvent, MetricsTx};
use crate::model::Ticker;
use crate::store::{DocumentStore, StorePaths, WriteFields};

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;

const SEED_PRICE_MIN: f64 = 100.0;
const SEED_PRICE_MAX: f64 = 150.0;
const WALK_VOLATILITY: f64 = 0.005;
const PRICE_FLOOR: f64 = 1.0;

#[derive(Clone, Debug)]
pub struct SimulatorConfig {
    pub tick_interval: Duration,
    pub max_ticks: Option<usize>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            max_ticks: None,
        }
    }
}

/// One ticker's movement within a tick, ready to be written out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceUpdate {
    pub ticker: Ticker,
    pub price: f64,
    pub previous: f64,
}

impl PriceUpdate {
    pub fn write_fields(&self) -> WriteFields {
        WriteFields::new()
            .field("ticker", self.ticker.symbol())
            .field("price", self.price)
            .field("previousPrice", self.previous)
            .server_timestamp("lastUpdate")
    }
}

/// Owned state of the walk. Prices live here, not in any shared cache, so a
/// restarted simulator starts from a fresh seed by construction.
#[derive(Debug)]
pub struct SimulatorState {
    prices: BTreeMap<Ticker, f64>,
    rng: StdRng,
}

impl SimulatorState {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic walk for tests.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            prices: BTreeMap::new(),
            rng,
        }
    }

    pub fn price(&self, ticker: Ticker) -> Option<f64> {
        self.prices.get(&ticker).copied()
    }

    /// Advances the walk one step for the whole roster. A ticker with no
    /// prior price is seeded in `[100, 150)` first, then walked, so even the
    /// first batch carries a meaningful `previous`.
    pub fn advance(&mut self) -> Vec<PriceUpdate> {
        Ticker::ALL
            .iter()
            .map(|&ticker| {
                let current = match self.prices.get(&ticker) {
                    Some(price) => *price,
                    None => self.rng.gen_range(SEED_PRICE_MIN..SEED_PRICE_MAX),
                };
                let pct = self.rng.gen_range(-WALK_VOLATILITY..WALK_VOLATILITY);
                let next = round_cents((current + current * pct).max(PRICE_FLOOR));
                self.prices.insert(ticker, next);
                PriceUpdate {
                    ticker,
                    price: next,
                    previous: current,
                }
            })
            .collect()
    }
}

impl Default for SimulatorState {
    fn default() -> Self {
        Self::new()
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Drives the walk on `config.tick_interval`. Per tick, all document writes
/// are issued concurrently and awaited together; failures are logged and the
/// next tick overwrites whatever they left behind. The timer never waits on
/// the store.
pub async fn run_price_simulator(
    store: Arc<dyn DocumentStore>,
    paths: StorePaths,
    config: SimulatorConfig,
    mut state: SimulatorState,
    mut shutdown: watch::Receiver<bool>,
    metrics: MetricsTx,
) -> Result<()> {
    let mut ticker = time::interval(config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut completed_ticks: usize = 0;

    logging::info(
        "simulator.start",
        "Price simulator started",
        json!({
            "interval_ms": config.tick_interval.as_millis() as u64,
            "tickers": Ticker::ALL.len(),
        }),
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        let updates = state.advance();
        let writes = updates.iter().map(|update| {
            let path = paths.price_document(update.ticker);
            let fields = update.write_fields();
            let store = Arc::clone(&store);
            async move { store.write(&path, fields).await }
        });

        let mut failures = 0usize;
        for (update, result) in updates.iter().zip(join_all(writes).await) {
            if let Err(err) = result {
                failures += 1;
                logging::warn(
                    "simulator.write_failed",
                    "Price write failed; next tick will overwrite",
                    json!({
                        "ticker": update.ticker.symbol(),
                        "error": err.to_string(),
                    }),
                );
            }
        }
        metrics.report(MetricsEvent::SimulatorBatch {
            writes: updates.len(),
            failures,
        });

        completed_ticks += 1;
        if let Some(max) = config.max_ticks {
            if completed_ticks >= max {
                logging::info(
                    "simulator.limit",
                    "Price simulator reached its tick limit",
                    json!({ "max_ticks": max }),
                );
                break;
            }
        }
    }

    logging::info_simple("simulator.stop", "Price simulator stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_advance_seeds_every_ticker_in_range() {
        let mut state = SimulatorState::with_seed(0xBADF00D);
        let updates = state.advance();

        assert_eq!(updates.len(), Ticker::ALL.len());
        for update in &updates {
            assert!(
                (SEED_PRICE_MIN..SEED_PRICE_MAX).contains(&update.previous),
                "seed {} out of range for {}",
                update.previous,
                update.ticker
            );
        }
    }

    #[test]
    fn walk_stays_within_the_volatility_bound() {
        let mut state = SimulatorState::with_seed(42);
        state.advance();

        for _ in 0..500 {
            let before: Vec<f64> = Ticker::ALL
                .iter()
                .map(|&t| state.price(t).unwrap())
                .collect();
            let updates = state.advance();
            for (update, old) in updates.iter().zip(before) {
                // Half a cent of slack for the 2-decimal rounding step.
                let bound = WALK_VOLATILITY * old + 0.005 + 1e-9;
                assert!(
                    (update.price - old).abs() <= bound,
                    "{}: {} -> {} exceeds bound {}",
                    update.ticker,
                    old,
                    update.price,
                    bound
                );
                assert!(update.price >= PRICE_FLOOR);
            }
        }
    }

    #[test]
    fn prices_are_rounded_to_cents() {
        let mut state = SimulatorState::with_seed(7);
        for _ in 0..10 {
            for update in state.advance() {
                let scaled = update.price * 100.0;
                assert!(
                    (scaled - scaled.round()).abs() < 1e-6,
                    "{} not cent-aligned",
                    update.price
                );
            }
        }
    }

    #[test]
    fn successive_ticks_compound_from_the_cache() {
        let mut state = SimulatorState::with_seed(9);
        state.advance();
        let after_first = state.price(Ticker::Goog).unwrap();

        let second = state.advance();
        let goog = second.iter().find(|u| u.ticker == Ticker::Goog).unwrap();
        assert_eq!(goog.previous, after_first);
        assert_eq!(state.price(Ticker::Goog), Some(goog.price));
    }

    #[test]
    fn floor_holds_even_from_a_low_price() {
        let mut state = SimulatorState::with_seed(1);
        state.advance();
        // Force the cache to the floor and keep walking.
        for price in state.prices.values_mut() {
            *price = PRICE_FLOOR;
        }
        for _ in 0..50 {
            for update in state.advance() {
                assert!(update.price >= PRICE_FLOOR);
            }
        }
    }

    #[test]
    fn update_fields_use_the_wire_names() {
        let update = PriceUpdate {
            ticker: Ticker::Tsla,
            price: 101.25,
            previous: 100.75,
        };
        let fields = update.write_fields();
        let names: Vec<&str> = fields
            .entries()
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(names, vec!["ticker", "price", "previousPrice", "lastUpdate"]);
    }
}
