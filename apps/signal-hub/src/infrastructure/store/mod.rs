//! Price Store Adapters
//!
//! Implementations of the `PriceStore` port:
//!
//! - `RedisPriceStore`: `HGETALL` of a hash of `symbol -> "price"` strings
//! - `InMemoryPriceStore`: a lock-guarded map, for tests and local runs

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

use crate::application::ports::{PriceHash, PriceStore, StoreError, parse_price_hash};

// =============================================================================
// Redis
// =============================================================================

/// Redis hash holding the latest price per symbol.
#[derive(Clone)]
pub struct RedisPriceStore {
    conn: MultiplexedConnection,
    key: String,
}

impl std::fmt::Debug for RedisPriceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPriceStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl RedisPriceStore {
    /// Connect to Redis at `url` and read the hash at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the connection cannot be opened.
    pub async fn connect(url: &str, key: impl Into<String>) -> Result<Self, StoreError> {
        let connection = |e: redis::RedisError| StoreError::Connection {
            message: e.to_string(),
        };
        let client = redis::Client::open(url).map_err(connection)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(connection)?;

        Ok(Self {
            conn,
            key: key.into(),
        })
    }
}

#[async_trait]
impl PriceStore for RedisPriceStore {
    async fn read_all(&self) -> Result<PriceHash, StoreError> {
        let mut conn = self.conn.clone();
        let raw: HashMap<String, String> =
            conn.hgetall(&self.key).await.map_err(|e| StoreError::Read {
                message: e.to_string(),
            })?;
        Ok(parse_price_hash(raw))
    }
}

// =============================================================================
// In-Memory
// =============================================================================

/// Process-local price hash with the same parsing rules as Redis.
#[derive(Debug, Default)]
pub struct InMemoryPriceStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryPriceStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set one raw hash field.
    pub fn set(&self, symbol: impl Into<String>, value: impl Into<String>) {
        self.entries.write().insert(symbol.into(), value.into());
    }

    /// Delete one hash field.
    pub fn remove(&self, symbol: &str) {
        self.entries.write().remove(symbol);
    }

    /// Set one price.
    pub fn set_price(&self, symbol: impl Into<String>, price: f64) {
        self.set(symbol, price.to_string());
    }
}

#[async_trait]
impl PriceStore for InMemoryPriceStore {
    async fn read_all(&self) -> Result<PriceHash, StoreError> {
        let snapshot = self.entries.read().clone();
        Ok(parse_price_hash(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_reads_back_prices() {
        let store = InMemoryPriceStore::new();
        store.set_price("BTC", 43_250.5);
        store.set("ETH", "2280");

        let prices = store.read_all().await.unwrap().prices;
        assert!((prices["BTC"] - 43_250.5).abs() < f64::EPSILON);
        assert!((prices["ETH"] - 2280.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn in_memory_sets_aside_bad_value() {
        let store = InMemoryPriceStore::new();
        store.set("BTC", "lots");
        store.set_price("ETH", 2280.0);

        let hash = store.read_all().await.unwrap();
        assert_eq!(hash.prices.len(), 1);
        assert!(matches!(
            hash.invalid.as_slice(),
            [StoreError::InvalidValue { symbol, .. }] if symbol == "BTC"
        ));
    }
}
