//! Signal Hub Binary
//!
//! Starts the market signal fan-in: price cache, normalizer and shipper.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin signal-hub
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `REDIS_URL`: Redis connection URL
//! - `INFLUXDB_URL`: InfluxDB base URL
//! - `INFLUXDB_ORG`: InfluxDB organization
//! - `INFLUXDB_BUCKET`: InfluxDB bucket
//! - `INFLUXDB_TOKEN`: InfluxDB API token
//!
//! ## Optional
//! - `SIGNAL_HUB_PRICE_SOURCE`: poll | stream (default: poll)
//! - `SIGNAL_HUB_PRICE_HASH_KEY`: Redis hash holding prices (default: market:currency_price)
//! - `SIGNAL_HUB_PRICE_TOPIC`: Price update topic in stream mode (default: market:currency_price_channel)
//! - `SIGNAL_HUB_PRICE_REFRESH_SECS`: Poll interval (default: 3)
//! - `SIGNAL_HUB_READY_POLL_SECS`: Readiness check interval (default: 3)
//! - `SIGNAL_HUB_READINESS_SYMBOLS`: Comma-separated readiness set (default: hot set)
//! - `SIGNAL_HUB_BATCH_SIZE`: Points per write (default: 32)
//! - `SIGNAL_HUB_FLUSH_INTERVAL_MS`: Periodic flush interval (default: 1000)
//! - `SIGNAL_HUB_REDIS_WAIT_SECS` / `SIGNAL_HUB_INFLUX_WAIT_SECS`: Startup retry interval
//! - `SIGNAL_HUB_BUS_CAPACITY`: Per-subscription buffer (default: 4096)
//! - `SIGNAL_HUB_RECONNECT_DELAY_*`: Bus reconnect backoff
//! - `SIGNAL_HUB_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `RUST_LOG`: Log filter (default: signal_hub=info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use signal_hub::application::ports::{MessageBus, PriceLookup, PriceStore, TimeSeriesWriter};
use signal_hub::infrastructure::bus::{BackoffConfig, RedisBus};
use signal_hub::infrastructure::influx::{DEFAULT_TIMEOUT, InfluxWriter};
use signal_hub::infrastructure::startup::{wait_for_influx, wait_for_redis};
use signal_hub::infrastructure::store::RedisPriceStore;
use signal_hub::infrastructure::telemetry;
use signal_hub::{
    HealthServer, HealthServerState, HubConfig, Normalizer, PriceCache, PriceSource, PriceTable,
    Shipper, SinkWriter, init_metrics,
};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Signal Hub");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = HubConfig::from_env().context("invalid configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();
    tokio::spawn(await_shutdown(shutdown_token.clone()));

    // Block until both backends answer
    let redis_up = wait_for_redis(
        config.redis.url(),
        config.startup.redis_wait_interval,
        &shutdown_token,
    )
    .await
    .context("invalid Redis URL")?;
    if !redis_up {
        tracing::info!("Shutdown requested while waiting for Redis");
        return Ok(());
    }

    let writer: Arc<dyn TimeSeriesWriter> = Arc::new(
        InfluxWriter::new(&config.influx, DEFAULT_TIMEOUT).context("invalid InfluxDB settings")?,
    );
    if !wait_for_influx(
        writer.as_ref(),
        config.startup.influx_wait_interval,
        &shutdown_token,
    )
    .await
    {
        tracing::info!("Shutdown requested while waiting for InfluxDB");
        return Ok(());
    }

    let bus: Arc<dyn MessageBus> = RedisBus::connect(
        config.redis.url(),
        config.bus.capacity,
        BackoffConfig::from(&config.bus),
    )
    .await
    .context("failed to connect message bus")?
    .shared();

    // Price table and the task keeping it current
    let table = Arc::new(PriceTable::new(
        config.prices.readiness.clone(),
        config.prices.ready_poll_interval,
    ));
    let cache = match config.prices.source {
        PriceSource::Poll => {
            let store: Arc<dyn PriceStore> = Arc::new(
                RedisPriceStore::connect(config.redis.url(), config.prices.hash_key.clone())
                    .await
                    .context("failed to connect price store")?,
            );
            PriceCache::poll(
                Arc::clone(&table),
                store,
                config.prices.refresh_interval,
                shutdown_token.child_token(),
            )
        }
        PriceSource::Stream => PriceCache::stream(
            Arc::clone(&table),
            bus.as_ref(),
            &config.prices.topic,
            shutdown_token.child_token(),
        )
        .await
        .context("failed to subscribe to price updates")?,
    };

    let lookup = Arc::clone(&table) as Arc<dyn PriceLookup>;
    let shipper = Shipper::new(
        Normalizer::new(lookup),
        SinkWriter::new(writer, config.pipeline.batch_size),
        config.pipeline.flush_interval,
    );

    // Health server comes up before readiness so /readyz can report it
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&table),
        shipper.stats(),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!(
        symbols = ?table.readiness().iter().collect::<Vec<_>>(),
        "Waiting for readiness prices"
    );
    let mut outcome = Ok(());
    if table.wait_until_ready_or_cancelled(&shutdown_token).await {
        tracing::info!(symbols = table.len(), "Price table ready");

        let shipper_bus = Arc::clone(&bus);
        let shipper_cancel = shutdown_token.clone();
        let shipper_task =
            tokio::spawn(async move { shipper.run(shipper_bus, shipper_cancel).await });

        tracing::info!("Signal hub ready");

        outcome = match shipper_task.await {
            Ok(result) => result.context("shipper failed"),
            Err(e) => Err(anyhow::anyhow!("shipper task panicked: {e}")),
        };
    }

    shutdown_token.cancel();
    cache.close().await;
    join_with_timeout("health", health_task).await;

    tracing::info!("Signal hub stopped");
    outcome
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}

/// Log the parsed configuration.
fn log_config(config: &HubConfig) {
    tracing::info!(
        price_source = config.prices.source.as_str(),
        readiness = config.prices.readiness.len(),
        batch_size = config.pipeline.batch_size,
        flush_interval_ms = config.pipeline.flush_interval.as_millis(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        redis = ?config.redis,
        influx = ?config.influx,
        "Backend endpoints"
    );
}

/// Join a background task, giving up after the shutdown timeout.
async fn join_with_timeout(name: &str, task: JoinHandle<()>) {
    match tokio::time::timeout(SHUTDOWN_TIMEOUT, task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(task = name, error = %e, "Task panicked"),
        Err(_) => tracing::warn!(task = name, "Task did not stop before the shutdown timeout"),
    }
}
