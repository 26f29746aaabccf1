//! Price Lookup Port (Driver Port)
//!
//! Synchronous read side of the price table, used at message-construction
//! time to convert native units into USD.

/// Read access to the latest USD price per symbol.
#[cfg_attr(test, mockall::automock)]
pub trait PriceLookup: Send + Sync {
    /// Latest known USD price, or `0.0` if the symbol was never observed.
    ///
    /// Zero means "unknown": callers suppress anything derived from it.
    fn price(&self, symbol: &str) -> f64;
}
