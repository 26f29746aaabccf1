//! Bus Topics
//!
//! The fixed catalogue of topics the normalizer understands. Names are the
//! wire-level channel names on the bus; each topic maps to exactly one
//! measurement in the time-series backend.

use std::fmt;
use std::str::FromStr;

/// Gas price tiers in wei, published by the gas-price crawler.
pub const TOPIC_ETH_GAS_PRICE: &str = "market:eth_gas_price";
/// New block headers with mining reward.
pub const TOPIC_ETH_BLOCK_HEADER: &str = "market:eth_block_header";
/// Exchange candlesticks.
pub const TOPIC_CANDLESTICK: &str = "market:candlestick";
/// Exchange candlesticks with extended statistics.
pub const TOPIC_CANDLESTICK_EXT: &str = "market:candlestick_ext";
/// Aggregate market metrics (total market cap, dominance, ...).
pub const TOPIC_CMC_GLOBAL_METRICS: &str = "market:cmc_global_metrics";
/// Per-asset USD price updates, single or batched.
pub const TOPIC_CURRENCY_PRICE: &str = "market:currency_price_channel";

/// A topic known to the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Gas price tiers.
    GasPrice,
    /// Block header.
    BlockHeader,
    /// Candlestick bar.
    Candlestick,
    /// Candlestick bar with extended statistics.
    CandlestickExt,
    /// Aggregate market metrics.
    GlobalMetrics,
    /// Asset USD prices.
    CurrencyPrice,
}

impl Topic {
    /// Every known topic.
    pub const ALL: [Self; 6] = [
        Self::GasPrice,
        Self::BlockHeader,
        Self::Candlestick,
        Self::CandlestickExt,
        Self::GlobalMetrics,
        Self::CurrencyPrice,
    ];

    /// Channel name on the bus.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::GasPrice => TOPIC_ETH_GAS_PRICE,
            Self::BlockHeader => TOPIC_ETH_BLOCK_HEADER,
            Self::Candlestick => TOPIC_CANDLESTICK,
            Self::CandlestickExt => TOPIC_CANDLESTICK_EXT,
            Self::GlobalMetrics => TOPIC_CMC_GLOBAL_METRICS,
            Self::CurrencyPrice => TOPIC_CURRENCY_PRICE,
        }
    }

    /// Measurement written for points normalized from this topic.
    #[must_use]
    pub const fn measurement(self) -> &'static str {
        match self {
            Self::GasPrice => "eth_gas_price",
            Self::BlockHeader => "eth_block_header",
            Self::Candlestick => "candlestick",
            Self::CandlestickExt => "candlestick_ext",
            Self::GlobalMetrics => "cmc_global_metrics",
            Self::CurrencyPrice => "currency_price",
        }
    }

    /// Look a topic up by channel name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name() == name)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A channel name outside the known catalogue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown topic: {0}")]
pub struct UnknownTopic(pub String);

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| UnknownTopic(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for topic in Topic::ALL {
            assert_eq!(topic.name().parse::<Topic>().unwrap(), topic);
        }
    }

    #[test]
    fn unknown_name_is_an_error() {
        let err = "market:nope".parse::<Topic>().unwrap_err();
        assert_eq!(err, UnknownTopic("market:nope".to_string()));
    }

    #[test]
    fn measurements_are_unique() {
        let mut names: Vec<_> = Topic::ALL.iter().map(|t| t.measurement()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Topic::ALL.len());
    }
}
