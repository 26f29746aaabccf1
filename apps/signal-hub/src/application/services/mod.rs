//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `PriceTable` / `PriceCache`: Latest USD price per symbol and its refresh task
//! - `Normalizer`: Topic-keyed conversion of payloads into time-series points
//! - `SinkWriter`: Batching writes to the time-series backend
//! - `Shipper`: The subscribe, normalize and write loop

mod normalizer;
mod price_table;
mod shipper;
mod sink;

pub use normalizer::{
    ETH_SYMBOL, NormalizeError, Normalized, Normalizer, TRANSFER_GAS, gas_cost_usd,
};
pub use price_table::{DEFAULT_REFRESH_INTERVAL, PriceCache, PriceTable};
pub use shipper::{
    DEFAULT_FLUSH_INTERVAL, PipelineSnapshot, PipelineStats, Shipper, ShipperError,
};
pub use sink::{DEFAULT_BATCH_SIZE, SinkWriter};
