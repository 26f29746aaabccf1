//! In-Memory Bus
//!
//! A process-local bus over a single tokio broadcast channel. Every
//! subscription gets its own forwarding task that filters by topic and
//! feeds the subscription's bounded queue.
//!
//! A subscriber that falls more than `capacity` messages behind loses the
//! overflow; the loss is logged and counted.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::application::ports::{BusError, MessageBus, RawMessage, Subscription};
use crate::infrastructure::metrics;

/// Default channel capacity.
pub const DEFAULT_CAPACITY: usize = 4096;

/// Process-local publish/subscribe bus.
#[derive(Debug)]
pub struct InMemoryBus {
    tx: broadcast::Sender<RawMessage>,
    capacity: usize,
}

/// Shared in-memory bus.
pub type SharedInMemoryBus = Arc<InMemoryBus>;

impl InMemoryBus {
    /// Create a bus whose channel and subscription queues hold `capacity` messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            tx: broadcast::channel(capacity).0,
            capacity,
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, topic: &str, payload: &[u8]) {
        if self.tx.send(RawMessage::new(topic, payload)).is_err() {
            debug!(topic, "Published with no subscribers");
        }
    }

    async fn subscribe(&self, topics: &[&str]) -> Result<Subscription, BusError> {
        if topics.is_empty() {
            return Err(BusError::Subscribe {
                message: "no topics given".to_string(),
            });
        }

        let filter: HashSet<String> = topics.iter().map(|t| (*t).to_string()).collect();
        let rx = self.tx.subscribe();
        let (tx, out) = mpsc::channel(self.capacity);
        let cancel = CancellationToken::new();

        tokio::spawn(forward(rx, filter, tx, cancel.clone()));
        Ok(Subscription::new(out, cancel))
    }
}

async fn forward(
    mut rx: broadcast::Receiver<RawMessage>,
    filter: HashSet<String>,
    tx: mpsc::Sender<RawMessage>,
    cancel: CancellationToken,
) {
    loop {
        let received = tokio::select! {
            () = cancel.cancelled() => break,
            received = rx.recv() => received,
        };

        match received {
            Ok(message) if filter.contains(&message.topic) => {
                let topic = message.topic.clone();
                tokio::select! {
                    () = cancel.cancelled() => break,
                    sent = tx.send(message) => if sent.is_err() { break },
                }
                debug!(topic, "Forwarded message");
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Subscriber lagged, messages lost");
                metrics::record_bus_lag(skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
