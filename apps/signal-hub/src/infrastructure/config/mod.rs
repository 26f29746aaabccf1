//! Configuration Module
//!
//! Configuration loading for the hub service.

mod settings;

pub use settings::{
    BusSettings, ConfigError, DEFAULT_PRICE_HASH_KEY, HubConfig, InfluxSettings, PipelineSettings,
    PriceSettings, PriceSource, RedisSettings, ServerSettings, StartupSettings,
};
