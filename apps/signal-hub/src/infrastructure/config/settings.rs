//! Hub Configuration Settings
//!
//! Configuration types for the signal hub, loaded from environment variables.

use std::time::Duration;

use crate::application::services::{
    DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL, DEFAULT_REFRESH_INTERVAL,
};
use crate::domain::price::ReadinessSet;
use crate::domain::topic::TOPIC_CURRENCY_PRICE;
use crate::infrastructure::bus::memory::DEFAULT_CAPACITY;

/// Default Redis hash holding `symbol -> price` float strings.
pub const DEFAULT_PRICE_HASH_KEY: &str = "market:currency_price";

/// How the price table is kept current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PriceSource {
    /// Periodic bulk read of the price hash.
    #[default]
    Poll,
    /// Continuous consumption of the price topic.
    Stream,
}

impl PriceSource {
    /// Parse a price source, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for anything but `poll` or `stream`.
    pub fn parse(key: &str, value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_lowercase().as_str() {
            "poll" => Ok(Self::Poll),
            "stream" => Ok(Self::Stream),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Name used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Stream => "stream",
        }
    }
}

/// Redis connection settings. The URL may carry a password.
#[derive(Clone)]
pub struct RedisSettings {
    url: String,
}

impl RedisSettings {
    /// Create settings for `url`.
    #[must_use]
    pub const fn new(url: String) -> Self {
        Self { url }
    }

    /// Connection URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Debug for RedisSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown = match self.url.rsplit_once('@') {
            Some((_, host)) => format!("redis://[REDACTED]@{host}"),
            None => self.url.clone(),
        };
        f.debug_struct("RedisSettings").field("url", &shown).finish()
    }
}

/// InfluxDB v2 connection settings.
#[derive(Clone)]
pub struct InfluxSettings {
    /// Base URL, e.g. `http://localhost:8086`.
    pub url: String,
    /// Organization.
    pub org: String,
    /// Target bucket.
    pub bucket: String,
    token: String,
}

impl InfluxSettings {
    /// Create settings.
    #[must_use]
    pub const fn new(url: String, org: String, bucket: String, token: String) -> Self {
        Self {
            url,
            org,
            bucket,
            token,
        }
    }

    /// API token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl std::fmt::Debug for InfluxSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxSettings")
            .field("url", &self.url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Price table settings.
#[derive(Debug, Clone)]
pub struct PriceSettings {
    /// Refresh mode.
    pub source: PriceSource,
    /// Hash read in poll mode.
    pub hash_key: String,
    /// Topic consumed in stream mode.
    pub topic: String,
    /// Poll-mode refresh interval.
    pub refresh_interval: Duration,
    /// Readiness re-check interval.
    pub ready_poll_interval: Duration,
    /// Symbols that must be priced before the table is ready.
    pub readiness: ReadinessSet,
}

impl Default for PriceSettings {
    fn default() -> Self {
        Self {
            source: PriceSource::Poll,
            hash_key: DEFAULT_PRICE_HASH_KEY.to_string(),
            topic: TOPIC_CURRENCY_PRICE.to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            ready_poll_interval: DEFAULT_REFRESH_INTERVAL,
            readiness: ReadinessSet::default(),
        }
    }
}

/// Sink pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Points per backend write.
    pub batch_size: usize,
    /// Periodic flush interval.
    pub flush_interval: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// Fixed retry intervals for the startup dependency waits.
#[derive(Debug, Clone)]
pub struct StartupSettings {
    /// Interval between Redis pings.
    pub redis_wait_interval: Duration,
    /// Interval between InfluxDB health checks.
    pub influx_wait_interval: Duration,
}

impl Default for StartupSettings {
    fn default() -> Self {
        Self {
            redis_wait_interval: Duration::from_secs(1),
            influx_wait_interval: Duration::from_secs(3),
        }
    }
}

/// Bus subscription settings.
#[derive(Debug, Clone)]
pub struct BusSettings {
    /// Per-subscription buffer (and in-memory bus channel) capacity.
    pub capacity: usize,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Bus and price store connection.
    pub redis: RedisSettings,
    /// Time-series backend.
    pub influx: InfluxSettings,
    /// Price table.
    pub prices: PriceSettings,
    /// Sink pipeline.
    pub pipeline: PipelineSettings,
    /// Startup waits.
    pub startup: StartupSettings,
    /// Bus subscriptions.
    pub bus: BusSettings,
    /// Server ports.
    pub server: ServerSettings,
}

impl HubConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or
    /// a value cannot be used.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let redis = RedisSettings::new(env.required("REDIS_URL")?);
        let influx = InfluxSettings::new(
            env.required("INFLUXDB_URL")?.trim_end_matches('/').to_string(),
            env.required("INFLUXDB_ORG")?,
            env.required("INFLUXDB_BUCKET")?,
            env.required("INFLUXDB_TOKEN")?,
        );

        let price_defaults = PriceSettings::default();
        let prices = PriceSettings {
            source: env
                .get("SIGNAL_HUB_PRICE_SOURCE")
                .map(|v| PriceSource::parse("SIGNAL_HUB_PRICE_SOURCE", &v))
                .transpose()?
                .unwrap_or_default(),
            hash_key: env
                .get("SIGNAL_HUB_PRICE_HASH_KEY")
                .unwrap_or(price_defaults.hash_key),
            topic: env
                .get("SIGNAL_HUB_PRICE_TOPIC")
                .unwrap_or(price_defaults.topic),
            refresh_interval: env.duration_secs(
                "SIGNAL_HUB_PRICE_REFRESH_SECS",
                price_defaults.refresh_interval,
            )?,
            ready_poll_interval: env.duration_secs(
                "SIGNAL_HUB_READY_POLL_SECS",
                price_defaults.ready_poll_interval,
            )?,
            readiness: env
                .get("SIGNAL_HUB_READINESS_SYMBOLS")
                .map_or(price_defaults.readiness, |v| ReadinessSet::parse_list(&v)),
        };

        let pipeline_defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            batch_size: env.parse("SIGNAL_HUB_BATCH_SIZE", pipeline_defaults.batch_size)?,
            flush_interval: env.duration_millis(
                "SIGNAL_HUB_FLUSH_INTERVAL_MS",
                pipeline_defaults.flush_interval,
            )?,
        };

        let startup_defaults = StartupSettings::default();
        let startup = StartupSettings {
            redis_wait_interval: env.duration_secs(
                "SIGNAL_HUB_REDIS_WAIT_SECS",
                startup_defaults.redis_wait_interval,
            )?,
            influx_wait_interval: env.duration_secs(
                "SIGNAL_HUB_INFLUX_WAIT_SECS",
                startup_defaults.influx_wait_interval,
            )?,
        };

        let bus_defaults = BusSettings::default();
        let bus = BusSettings {
            capacity: env.parse("SIGNAL_HUB_BUS_CAPACITY", bus_defaults.capacity)?,
            reconnect_delay_initial: env.duration_millis(
                "SIGNAL_HUB_RECONNECT_DELAY_INITIAL_MS",
                bus_defaults.reconnect_delay_initial,
            )?,
            reconnect_delay_max: env.duration_secs(
                "SIGNAL_HUB_RECONNECT_DELAY_MAX_SECS",
                bus_defaults.reconnect_delay_max,
            )?,
            reconnect_delay_multiplier: env.parse(
                "SIGNAL_HUB_RECONNECT_DELAY_MULTIPLIER",
                bus_defaults.reconnect_delay_multiplier,
            )?,
        };

        let server = ServerSettings {
            health_port: env.parse("SIGNAL_HUB_HEALTH_PORT", ServerSettings::default().health_port)?,
        };

        if pipeline.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SIGNAL_HUB_BATCH_SIZE".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            redis,
            influx,
            prices,
            pipeline,
            startup,
            bus,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable cannot be parsed.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
}

struct Env<'a, F>(&'a F);

impl<F> Env<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = (self.0)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
            }),
        }
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse::<u64>(key, default.as_secs())
            .map(Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let default = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.parse::<u64>(key, default).map(Duration::from_millis)
    }
}
