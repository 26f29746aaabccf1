//! InfluxDB Adapter
//!
//! Line-protocol encoding and the HTTP writer implementing `TimeSeriesWriter`.

pub mod line_protocol;
pub mod writer;

pub use writer::{DEFAULT_TIMEOUT, InfluxWriter};
