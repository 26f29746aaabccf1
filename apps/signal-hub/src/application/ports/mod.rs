//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `MessageBus`: publish/subscribe transport carrying raw topic payloads
//! - `PriceStore`: durable keyed store holding the latest price per symbol
//! - `TimeSeriesWriter`: batched writes of normalized points
//!
//! ## Driver Ports (Inbound)
//!
//! - `PriceLookup`: synchronous unit-conversion price reads for feed processors

mod bus_port;
mod price_lookup_port;
mod price_store_port;
mod writer_port;

pub use bus_port::{BusError, MessageBus, RawMessage, Subscription};
pub use price_lookup_port::PriceLookup;
#[cfg(test)]
pub use price_lookup_port::MockPriceLookup;
#[cfg(test)]
pub use price_store_port::MockPriceStore;
pub use price_store_port::{PriceHash, PriceStore, StoreError, parse_price_hash};
#[cfg(test)]
pub use writer_port::MockTimeSeriesWriter;
pub use writer_port::{SinkError, TimeSeriesWriter};
