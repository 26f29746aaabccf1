#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Signal Hub - Market Signal Fan-in and Normalization
//!
//! Subscribes to market-data topics on the message bus, keeps a shared
//! per-asset USD price table, and normalizes heterogeneous payloads into
//! time-series points written in batches to InfluxDB.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure data types
//!   - `price`: Asset prices, price updates, readiness set
//!   - `point`: Normalized time-series points
//!   - `topic`: Bus topic names and their measurements
//!   - `feeds`: Wire payloads published by the collectors
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Message bus, price store, price lookup, time-series writer
//!   - `services`: Price table and cache, normalizer, sink writer, shipper
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `bus`: In-memory and Redis pub/sub buses with reconnect
//!   - `store`: Redis hash and in-memory price stores
//!   - `influx`: Line-protocol encoder and HTTP writer
//!   - `startup`: Dependency waits
//!   - `config`: Configuration from the environment
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! collectors ──► bus ──┬──► PriceCache ──► PriceTable
//!                      │                      │ lookup
//!                      └──► Shipper ──► Normalizer ──► SinkWriter ──► InfluxDB
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::feeds::{DecodeError, TopicPayload};
pub use domain::point::{FieldValue, Fields, NormalizedPoint, PointError, Tags};
pub use domain::price::{AssetPrice, HOT_SYMBOLS, PriceUpdate, ReadinessSet};
pub use domain::topic::{Topic, UnknownTopic};

// Ports
pub use application::ports::{
    BusError, MessageBus, PriceLookup, PriceStore, RawMessage, SinkError, StoreError,
    Subscription, TimeSeriesWriter,
};

// Services
pub use application::services::{
    NormalizeError, Normalized, Normalizer, PipelineSnapshot, PipelineStats, PriceCache, PriceTable, Shipper,
    ShipperError, SinkWriter,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, HubConfig, InfluxSettings, PipelineSettings, PriceSettings, PriceSource,
    RedisSettings, ServerSettings,
};

// Adapters
pub use infrastructure::bus::{InMemoryBus, RedisBus, SharedInMemoryBus};
pub use infrastructure::influx::InfluxWriter;
pub use infrastructure::store::{InMemoryPriceStore, RedisPriceStore};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
