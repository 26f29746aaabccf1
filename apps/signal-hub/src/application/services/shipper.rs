//! Shipper Pipeline
//!
//! Subscribes to every normalizer topic, normalizes each message and feeds
//! the points to the sink writer. The sink is flushed when a batch fills,
//! on a fixed interval, and once more on shutdown.
//!
//! Decode failures drop the single message. An unknown topic stops the
//! pipeline with an error.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::normalizer::{NormalizeError, Normalized, Normalizer};
use super::sink::SinkWriter;
use crate::application::ports::{BusError, MessageBus, RawMessage};
use crate::domain::topic::Topic;
use crate::infrastructure::metrics;

/// Default periodic flush interval.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Shipper error.
#[derive(Debug, thiserror::Error)]
pub enum ShipperError {
    /// The subscription could not be established.
    #[error("subscription failed: {0}")]
    Subscribe(#[from] BusError),

    /// A message could not be routed. Indicates miswiring.
    #[error("routing failed: {0}")]
    Routing(#[source] NormalizeError),
}

// =============================================================================
// Pipeline Statistics
// =============================================================================

/// Running counters for the health endpoint.
#[derive(Debug, Default)]
pub struct PipelineStats {
    received: AtomicU64,
    emitted: AtomicU64,
    suppressed: AtomicU64,
    decode_failures: AtomicU64,
    written: AtomicU64,
    write_failures: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PipelineSnapshot {
    /// Messages received from the bus.
    pub received: u64,
    /// Points handed to the sink.
    pub emitted: u64,
    /// Messages suppressed for lack of a price.
    pub suppressed: u64,
    /// Messages dropped for a schema mismatch.
    pub decode_failures: u64,
    /// Points accepted by the backend.
    pub written: u64,
    /// Batch writes that failed.
    pub write_failures: u64,
}

impl PipelineStats {
    /// Copy the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            received: self.received.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
        }
    }

    fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

// =============================================================================
// Shipper
// =============================================================================

/// The normalize-and-ship loop.
#[derive(Debug)]
pub struct Shipper {
    normalizer: Normalizer,
    sink: SinkWriter,
    flush_interval: Duration,
    stats: Arc<PipelineStats>,
}

impl Shipper {
    /// Create a shipper.
    #[must_use]
    pub fn new(normalizer: Normalizer, sink: SinkWriter, flush_interval: Duration) -> Self {
        Self {
            normalizer,
            sink,
            flush_interval,
            stats: Arc::new(PipelineStats::default()),
        }
    }

    /// Shared counters, for the health server.
    #[must_use]
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Subscribe to every known topic and run until `cancel` fires or the
    /// subscription ends. The sink is flushed before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ShipperError`] if subscribing fails or a message arrives on
    /// a topic the normalizer cannot route.
    pub async fn run(
        mut self,
        bus: Arc<dyn MessageBus>,
        cancel: CancellationToken,
    ) -> Result<(), ShipperError> {
        let topics: Vec<&str> = Topic::ALL.iter().map(|t| t.name()).collect();
        let mut subscription = bus.subscribe(&topics).await?;
        info!(topics = ?topics, "Shipper subscribed");

        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let outcome = loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Shipper shutting down");
                    break Ok(());
                }
                _ = ticker.tick() => self.flush().await,
                message = subscription.next_message() => {
                    let Some(message) = message else {
                        warn!("Shipper subscription ended");
                        break Ok(());
                    };
                    if let Err(e) = self.handle(&message).await {
                        error!(topic = %message.topic, error = %e, "Unroutable message");
                        break Err(ShipperError::Routing(e));
                    }
                }
            }
        };

        subscription.close();
        self.flush().await;
        outcome
    }

    /// Normalize one message and buffer its points.
    ///
    /// # Errors
    ///
    /// Returns the [`NormalizeError`] only when it is fatal.
    pub async fn handle(&mut self, message: &RawMessage) -> Result<(), NormalizeError> {
        PipelineStats::add(&self.stats.received, 1);
        let topic = message.topic.parse::<Topic>().ok();
        if let Some(topic) = topic {
            metrics::record_message_received(topic);
        }

        let points = match self.normalizer.normalize(message) {
            Ok(Normalized::Points(points)) => points,
            Ok(Normalized::Suppressed) => {
                PipelineStats::add(&self.stats.suppressed, 1);
                return Ok(());
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                PipelineStats::add(&self.stats.decode_failures, 1);
                if let Some(topic) = topic {
                    metrics::record_decode_failure(topic);
                }
                debug!(topic = %message.topic, error = %e, "Dropping undecodable message");
                return Ok(());
            }
        };

        if points.is_empty() {
            return Ok(());
        }

        let count = points.len() as u64;
        PipelineStats::add(&self.stats.emitted, count);
        if let Some(topic) = topic {
            metrics::record_points_emitted(topic, count);
        }

        for point in points {
            match self.sink.write(point).await {
                Ok(written) => PipelineStats::add(&self.stats.written, written as u64),
                Err(_) => PipelineStats::add(&self.stats.write_failures, 1),
            }
        }
        Ok(())
    }

    /// Flush the sink, updating counters.
    pub async fn flush(&mut self) {
        match self.sink.flush().await {
            Ok(written) => PipelineStats::add(&self.stats.written, written as u64),
            Err(_) => PipelineStats::add(&self.stats.write_failures, 1),
        }
    }
}
