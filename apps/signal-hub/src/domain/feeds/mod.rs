//! Feed Payload Schemas
//!
//! Wire format types for the JSON documents published on each topic, and
//! the tagged decode step that turns a raw payload into one of them.
//!
//! # Message Types
//!
//! - `GasPriceRecord`: gas price tiers in wei plus an epoch-ms timestamp
//! - `BlockHeaderRecord`: block number, miner, gas figures and mining reward
//! - `CandlestickRecord`: identifying strings plus a flat map of numeric values
//! - `GlobalMetricsRecord`: flat numeric map stamped by an RFC 3339 string
//! - `PriceUpdate`: one or many asset prices (see [`crate::domain::price`])

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::price::PriceUpdate;
use crate::domain::topic::Topic;

// =============================================================================
// Gas Price
// =============================================================================

/// Gas price tiers in wei.
///
/// # Wire Format (JSON)
/// ```json
/// {"rapid": 21000000000000, "fast": 15000000000000, "standard": 12000000000000,
///  "slow": 9000000000000, "timestamp": 1700000000000}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPriceRecord {
    /// Rapid tier, wei.
    pub rapid: u64,
    /// Fast tier, wei.
    pub fast: u64,
    /// Standard tier, wei.
    pub standard: u64,
    /// Slow tier, wei.
    pub slow: u64,
    /// Unix timestamp in milliseconds.
    pub timestamp: i64,
}

// =============================================================================
// Block Header
// =============================================================================

/// Block header enriched with the mining reward.
///
/// # Wire Format (JSON)
/// ```json
/// {"number": 18500000, "miner": "0x95222290dd7278aa3ddd389cc1e1d165cc4bafe5",
///  "gasLimit": 30000000, "gasUsed": 14000000, "reward": 2.05,
///  "reward_usd": 4100.0, "timestamp": 1700000000}
/// ```
///
/// `timestamp` is in seconds. `reward` is in ETH; `reward_usd` may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeaderRecord {
    /// Block number.
    pub number: u64,
    /// Miner address.
    pub miner: String,
    /// Block gas limit.
    #[serde(rename = "gasLimit")]
    pub gas_limit: u64,
    /// Gas used by the block.
    #[serde(rename = "gasUsed")]
    pub gas_used: u64,
    /// Block reward in ETH.
    pub reward: f64,
    /// Block reward in USD, if the publisher already converted it.
    #[serde(default)]
    pub reward_usd: Option<f64>,
    /// Unix timestamp in seconds.
    pub timestamp: i64,
}

// =============================================================================
// Candlestick
// =============================================================================

/// A candlestick bar: identifying strings plus arbitrary numeric statistics.
///
/// # Wire Format (JSON)
/// ```json
/// {"exchange": "binance", "market_type": "spot", "symbol": "BTCUSDT",
///  "pair": "BTC/USDT", "bar_size": 60, "timestamp": 1700000000000,
///  "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5, "volume": 10.0}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandlestickRecord {
    /// Exchange name.
    pub exchange: String,
    /// Market type, e.g. `spot`, `linear_swap`.
    pub market_type: String,
    /// Exchange-specific symbol.
    pub symbol: String,
    /// Unified pair, `BASE/QUOTE`.
    pub pair: String,
    /// Bar size in seconds.
    pub bar_size: f64,
    /// Bar open time, Unix milliseconds.
    pub timestamp: i64,
    /// Every other top-level key.
    #[serde(flatten)]
    pub values: BTreeMap<String, serde_json::Value>,
}

// =============================================================================
// Global Metrics
// =============================================================================

/// Aggregate market metrics.
///
/// # Wire Format (JSON)
/// ```json
/// {"active_cryptocurrencies": 7000, "btc_dominance": 51.2,
///  "total_market_cap": 1.4e12, "last_updated": "2023-11-14T22:13:20.000Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetricsRecord {
    /// RFC 3339 time the metrics were computed.
    pub last_updated: String,
    /// Every other top-level key.
    #[serde(flatten)]
    pub values: BTreeMap<String, serde_json::Value>,
}

// =============================================================================
// Tagged Decode
// =============================================================================

/// Errors raised when a payload does not match its topic's schema.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The payload is not the JSON shape expected for the topic.
    #[error("payload on {topic} does not match its schema: {source}")]
    Schema {
        /// Topic the payload arrived on.
        topic: Topic,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The pair is not `BASE/QUOTE`.
    #[error("invalid pair: {0:?}")]
    InvalidPair(String),

    /// The embedded timestamp cannot be resolved to an absolute time.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

/// A payload decoded according to the topic it arrived on.
#[derive(Debug, Clone, PartialEq)]
pub enum TopicPayload {
    /// Gas price tiers.
    GasPrice(GasPriceRecord),
    /// Block header.
    BlockHeader(BlockHeaderRecord),
    /// Candlestick bar (plain or extended, per the topic).
    Candlestick(CandlestickRecord),
    /// Aggregate market metrics.
    GlobalMetrics(GlobalMetricsRecord),
    /// Asset prices.
    CurrencyPrice(PriceUpdate),
}

impl TopicPayload {
    /// Decode `payload` with the schema belonging to `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Schema`] if the payload does not fit.
    pub fn decode(topic: Topic, payload: &[u8]) -> Result<Self, DecodeError> {
        let schema = |source| DecodeError::Schema { topic, source };

        Ok(match topic {
            Topic::GasPrice => Self::GasPrice(serde_json::from_slice(payload).map_err(schema)?),
            Topic::BlockHeader => {
                Self::BlockHeader(serde_json::from_slice(payload).map_err(schema)?)
            }
            Topic::Candlestick | Topic::CandlestickExt => {
                Self::Candlestick(serde_json::from_slice(payload).map_err(schema)?)
            }
            Topic::GlobalMetrics => {
                Self::GlobalMetrics(serde_json::from_slice(payload).map_err(schema)?)
            }
            Topic::CurrencyPrice => {
                Self::CurrencyPrice(PriceUpdate::from_slice(payload).map_err(schema)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_gas_price() {
        let payload = br#"{"rapid":21000000000000,"fast":2,"standard":3,"slow":4,"timestamp":1700000000000}"#;
        let TopicPayload::GasPrice(record) = TopicPayload::decode(Topic::GasPrice, payload).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(record.rapid, 21_000_000_000_000);
        assert_eq!(record.timestamp, 1_700_000_000_000);
    }

    #[test]
    fn decodes_block_header_without_usd() {
        let payload = br#"{"number":1,"miner":"0xabc","gasLimit":30,"gasUsed":20,"reward":2.0,"timestamp":1700000000}"#;
        let TopicPayload::BlockHeader(record) =
            TopicPayload::decode(Topic::BlockHeader, payload).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(record.gas_limit, 30);
        assert_eq!(record.reward_usd, None);
    }

    #[test]
    fn candlestick_keeps_extra_keys() {
        let payload = br#"{"exchange":"X","market_type":"spot","symbol":"BTCUSDT","pair":"BTC/USDT","bar_size":60,"timestamp":1700000000000,"open":1,"close":2}"#;
        let TopicPayload::Candlestick(record) =
            TopicPayload::decode(Topic::CandlestickExt, payload).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(record.values.len(), 2);
        assert!(record.values.contains_key("open"));
        assert!(!record.values.contains_key("exchange"));
        assert!(!record.values.contains_key("timestamp"));
    }

    #[test]
    fn schema_mismatch_names_topic() {
        let err = TopicPayload::decode(Topic::GasPrice, br#"{"rapid":"fast"}"#).unwrap_err();
        assert!(err.to_string().contains(Topic::GasPrice.name()));
    }
}
