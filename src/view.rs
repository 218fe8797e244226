//! Headless presentation state: screen routing and the derived per-ticker
//! view the dashboard renders from.

use crate::model::{PriceBook, SessionIdentity, SubscribedSet, Ticker};

/// Literal shown when no price record exists for a ticker yet.
pub const MISSING_PRICE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Loading,
    Auth,
    Dashboard,
}

/// Until the first session resolution the app stays on `Loading`. Anonymous
/// sessions count as "not logged in" and route to the auth screen.
pub fn route(auth_ready: bool, session: Option<&SessionIdentity>) -> Screen {
    if !auth_ready {
        return Screen::Loading;
    }
    match session {
        Some(identity) if !identity.anonymous => Screen::Dashboard,
        _ => Screen::Auth,
    }
}

/// Derived state for one ticker. Direction comes from the record's own
/// `previousPrice`, not from anything remembered client side, so it reads
/// the same after a reconnect.
#[derive(Debug, Clone, PartialEq)]
pub struct StockView {
    pub ticker: Ticker,
    pub display_price: String,
    pub is_subscribed: bool,
    pub is_rising: bool,
    pub is_falling: bool,
    pub last_update: Option<u64>,
}

pub fn stock_view(prices: &PriceBook, subscribed: &SubscribedSet, ticker: Ticker) -> StockView {
    let record = prices.get(&ticker);
    let (is_rising, is_falling) = match record {
        Some(record) => match record.previous_price {
            Some(previous) => (record.price > previous, record.price < previous),
            None => (false, false),
        },
        None => (false, false),
    };

    StockView {
        ticker,
        display_price: record
            .map(|r| format_price(r.price))
            .unwrap_or_else(|| MISSING_PRICE.to_string()),
        is_subscribed: subscribed.contains(&ticker),
        is_rising,
        is_falling,
        last_update: record.and_then(|r| r.last_update),
    }
}

/// Exactly two decimal places.
pub fn format_price(price: f64) -> String {
    format!("{price:.2}")
}

/// Price cell text for a watchlist row. A row can exist before its first
/// price record arrives; inside the table that renders as "--".
pub fn price_cell(view: &StockView) -> &str {
    if view.display_price == MISSING_PRICE {
        "--"
    } else {
        &view.display_price
    }
}

/// Row glyph for the watchlist's change column.
pub fn direction_label(view: &StockView) -> &'static str {
    if view.is_rising {
        "▲"
    } else if view.is_falling {
        "▼"
    } else {
        "--"
    }
}

/// Views for the subscribed tickers, ordered by symbol for the table.
pub fn watchlist_rows(prices: &PriceBook, subscribed: &SubscribedSet) -> Vec<StockView> {
    let mut rows: Vec<StockView> = subscribed
        .iter()
        .map(|&ticker| stock_view(prices, subscribed, ticker))
        .collect();
    rows.sort_by_key(|row| row.ticker.symbol());
    rows
}

/// Roster-ordered tickers not yet subscribed; an empty result hides the
/// picker entirely.
pub fn available_tickers(subscribed: &SubscribedSet) -> Vec<Ticker> {
    Ticker::ALL
        .iter()
        .copied()
        .filter(|ticker| !subscribed.contains(ticker))
        .collect()
}
