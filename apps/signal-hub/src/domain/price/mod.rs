//! Asset Price Types
//!
//! Domain types for the per-asset USD price mirror: a single observed price,
//! the update shapes carried on the price topic, and the readiness set that
//! gates consumers until the majors have been seen.
//!
//! # Wire Format (JSON)
//!
//! A price update is either a single object or an array of objects:
//!
//! ```json
//! {"symbol": "BTC", "price_usd": 43250.5}
//! [{"symbol": "BTC", "price_usd": 43250.5}, {"symbol": "ETH", "price_usd": 2280.1}]
//! ```
//!
//! Upstream mark-price relays publish `{"currency": "BTC", "price": 43250.5}`;
//! both spellings are accepted.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Symbols that must be priced before the table is considered usable.
pub const HOT_SYMBOLS: [&str; 14] = [
    "BTC", "ETH", "BNB", "ADA", "DOT", "XRP", "UNI", "LTC", "THETA", "LINK", "BCH", "XLM", "KLAY",
    "FIL",
];

/// Latest USD price observed for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPrice {
    /// Asset symbol, e.g. `BTC`.
    #[serde(alias = "currency")]
    pub symbol: String,

    /// Price in USD.
    #[serde(alias = "price")]
    pub price_usd: f64,

    /// When the price was observed. Defaults to arrival time when absent.
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
}

impl AssetPrice {
    /// Create a price observed now.
    #[must_use]
    pub fn new(symbol: impl Into<String>, price_usd: f64) -> Self {
        Self {
            symbol: symbol.into(),
            price_usd,
            observed_at: Utc::now(),
        }
    }
}

/// A message on the price topic: one price or a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceUpdate {
    /// A single symbol update.
    Single(AssetPrice),
    /// Several symbols updated at once.
    Batch(Vec<AssetPrice>),
}

impl PriceUpdate {
    /// Decode a price-topic payload.
    ///
    /// # Errors
    ///
    /// Returns the JSON error if the payload is neither shape.
    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Iterate the prices named by this update, in message order.
    pub fn prices(&self) -> impl Iterator<Item = &AssetPrice> {
        let slice: &[AssetPrice] = match self {
            Self::Single(price) => std::slice::from_ref(price),
            Self::Batch(prices) => prices,
        };
        slice.iter()
    }

    /// Consume the update into its prices.
    #[must_use]
    pub fn into_prices(self) -> Vec<AssetPrice> {
        match self {
            Self::Single(price) => vec![price],
            Self::Batch(prices) => prices,
        }
    }
}

/// Immutable set of symbols that gates price-table readiness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessSet {
    symbols: BTreeSet<String>,
}

impl ReadinessSet {
    /// Create a readiness set from symbols. Duplicates collapse.
    #[must_use]
    pub fn new<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            symbols: symbols.into_iter().map(Into::into).collect(),
        }
    }

    /// An empty set; a table with it is ready immediately.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            symbols: BTreeSet::new(),
        }
    }

    /// Parse a comma-separated list such as `"BTC, eth,SOL"`. Symbols are upper-cased.
    #[must_use]
    pub fn parse_list(list: &str) -> Self {
        Self::new(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_uppercase),
        )
    }

    /// Iterate symbols in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.symbols.iter().map(String::as_str)
    }

    /// Number of symbols in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the set has no symbols.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Default for ReadinessSet {
    fn default() -> Self {
        Self::new(HOT_SYMBOLS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_update() {
        let update = PriceUpdate::from_slice(br#"{"symbol":"BTC","price_usd":100.0}"#).unwrap();
        let prices: Vec<_> = update.prices().collect();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].symbol, "BTC");
        assert!((prices[0].price_usd - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn decodes_batch_update() {
        let update = PriceUpdate::from_slice(
            br#"[{"symbol":"BTC","price_usd":100.0},{"symbol":"ETH","price_usd":50.0}]"#,
        )
        .unwrap();
        assert!(matches!(update, PriceUpdate::Batch(ref v) if v.len() == 2));
    }

    #[test]
    fn accepts_relay_field_names() {
        let update = PriceUpdate::from_slice(br#"{"currency":"ETH","price":2000.5}"#).unwrap();
        let price = update.into_prices().remove(0);
        assert_eq!(price.symbol, "ETH");
        assert!((price.price_usd - 2000.5).abs() < f64::EPSILON);
    }

    #[test]
    fn keeps_explicit_observation_time() {
        let update = PriceUpdate::from_slice(
            br#"{"symbol":"BTC","price_usd":1.0,"observed_at":"2023-11-14T22:13:20Z"}"#,
        )
        .unwrap();
        let price = update.into_prices().remove(0);
        assert_eq!(price.observed_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn rejects_garbage() {
        assert!(PriceUpdate::from_slice(b"not json").is_err());
        assert!(PriceUpdate::from_slice(br#"{"symbol":"BTC"}"#).is_err());
    }

    #[test]
    fn readiness_list_parsing() {
        let set = ReadinessSet::parse_list(" btc,ETH,, eth ");
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["BTC", "ETH"]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn default_readiness_is_hot_symbols() {
        let set = ReadinessSet::default();
        assert_eq!(set.len(), HOT_SYMBOLS.len());
        assert!(set.iter().any(|s| s == "KLAY"));
    }
}
