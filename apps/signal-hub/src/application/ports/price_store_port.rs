//! Price Store Port (Driven Port)
//!
//! Interface for the durable keyed store that holds the latest price per
//! symbol as a flat hash of float strings.

use std::collections::HashMap;

use async_trait::async_trait;

/// Price store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("Price store connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// The bulk read failed.
    #[error("Price store read failed: {message}")]
    Read {
        /// Error details.
        message: String,
    },

    /// A stored value is not a float.
    #[error("Invalid price for {symbol}: {value:?}")]
    InvalidValue {
        /// Symbol whose value failed to parse.
        symbol: String,
        /// Raw stored value.
        value: String,
    },
}

/// Result of one bulk read: every parsable price plus the entries rejected.
#[derive(Debug, Clone, Default)]
pub struct PriceHash {
    /// Parsed `symbol -> price_usd` entries.
    pub prices: HashMap<String, f64>,
    /// One [`StoreError::InvalidValue`] per unparsable entry.
    pub invalid: Vec<StoreError>,
}

/// Port for bulk-reading the stored price hash.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Read every `symbol -> price_usd` entry.
    ///
    /// Unparsable values are reported in [`PriceHash::invalid`] and do not
    /// fail the read.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store cannot be read.
    async fn read_all(&self) -> Result<PriceHash, StoreError>;
}

/// Parse a raw stored hash, setting aside values that are not finite floats.
pub fn parse_price_hash<I>(raw: I) -> PriceHash
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut hash = PriceHash::default();
    for (symbol, value) in raw {
        match value.trim().parse::<f64>() {
            Ok(price) if price.is_finite() => {
                hash.prices.insert(symbol, price);
            }
            _ => hash.invalid.push(StoreError::InvalidValue { symbol, value }),
        }
    }
    hash
}
