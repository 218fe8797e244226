use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fixed ticker universe. Declaration order is the picker's display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Ticker {
    Goog,
    Tsla,
    Amzn,
    Meta,
    Nvda,
}

impl Ticker {
    pub const ALL: [Ticker; 5] = [
        Ticker::Goog,
        Ticker::Tsla,
        Ticker::Amzn,
        Ticker::Meta,
        Ticker::Nvda,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            Ticker::Goog => "GOOG",
            Ticker::Tsla => "TSLA",
            Ticker::Amzn => "AMZN",
            Ticker::Meta => "META",
            Ticker::Nvda => "NVDA",
        }
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Ticker {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GOOG" => Ok(Ticker::Goog),
            "TSLA" => Ok(Ticker::Tsla),
            "AMZN" => Ok(Ticker::Amzn),
            "META" => Ok(Ticker::Meta),
            "NVDA" => Ok(Ticker::Nvda),
            _ => Err(()),
        }
    }
}

/// Shared per-ticker price document, one per ticker, overwritten on every
/// simulator tick. Field names match the wire layout of the price collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceRecord {
    pub ticker: Ticker,
    pub price: f64,
    pub previous_price: Option<f64>,
    pub last_update: Option<u64>,
}

/// Per-user subscription document; its existence under the user's
/// subscriptions collection is what "subscribed" means.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub ticker: Ticker,
    pub subscribed_at: Option<u64>,
}

/// The authenticated (or anonymous) principal reads and writes run under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub uid: String,
    pub email: Option<String>,
    pub anonymous: bool,
}

impl SessionIdentity {
    /// Header label: the account email, or a generic fallback.
    pub fn display_label(&self) -> &str {
        self.email.as_deref().unwrap_or("User")
    }
}

/// Latest known price per ticker, replaced wholesale on every snapshot.
pub type PriceBook = BTreeMap<Ticker, PriceRecord>;

/// Tickers the signed-in user follows, derived from document ids.
pub type SubscribedSet = BTreeSet<Ticker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_serializes_as_symbol() {
        let json = serde_json::to_string(&Ticker::Goog).expect("serialize ticker");
        assert_eq!(json, "\"GOOG\"");
        let parsed: Ticker = serde_json::from_str("\"NVDA\"").expect("deserialize ticker");
        assert_eq!(parsed, Ticker::Nvda);
    }

    #[test]
    fn ticker_parses_known_symbols_only() {
        assert_eq!("TSLA".parse::<Ticker>(), Ok(Ticker::Tsla));
        assert!("DOGE".parse::<Ticker>().is_err());
        assert!("goog".parse::<Ticker>().is_err());
    }

    #[test]
    fn price_record_deserializes_from_sample() {
        let json = r#"{
            "ticker": "META",
            "price": 131.57,
            "previousPrice": 131.22,
            "lastUpdate": 1716400005123
        }"#;

        let record: PriceRecord = serde_json::from_str(json).expect("valid price record");
        assert_eq!(record.ticker, Ticker::Meta);
        assert_eq!(record.price, 131.57);
        assert_eq!(record.previous_price, Some(131.22));
        assert_eq!(record.last_update, Some(1_716_400_005_123));
    }

    #[test]
    fn price_record_tolerates_missing_optional_fields() {
        let json = r#"{ "ticker": "AMZN", "price": 104.0 }"#;
        let record: PriceRecord = serde_json::from_str(json).expect("minimal price record");
        assert_eq!(record.previous_price, None);
        assert_eq!(record.last_update, None);
    }

    #[test]
    fn display_label_falls_back_for_anonymous_sessions() {
        let anon = SessionIdentity {
            uid: "x".into(),
            email: None,
            anonymous: true,
        };
        assert_eq!(anon.display_label(), "User");

        let named = SessionIdentity {
            uid: "y".into(),
            email: Some("trader@example.com".into()),
            anonymous: false,
        };
        assert_eq!(named.display_label(), "trader@example.com");
    }
}
