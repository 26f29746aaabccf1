//! Redis Pub/Sub Bus
//!
//! Publishes over a multiplexed connection and subscribes over dedicated
//! pub/sub connections. A dropped subscription connection is re-established
//! with backoff and resubscribed to the same channels; the consumer keeps
//! reading from the same `Subscription`.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use redis::AsyncCommands;
use redis::aio::{MultiplexedConnection, PubSub};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::reconnect::{Backoff, BackoffConfig};
use crate::application::ports::{BusError, MessageBus, RawMessage, Subscription};
use crate::infrastructure::metrics;

/// Redis-backed message bus.
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    publisher: MultiplexedConnection,
    capacity: usize,
    backoff: BackoffConfig,
}

impl std::fmt::Debug for RedisBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBus")
            .field("capacity", &self.capacity)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl RedisBus {
    /// Connect to Redis at `url`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Connection`] if the URL is invalid or the
    /// publishing connection cannot be opened.
    pub async fn connect(
        url: &str,
        capacity: usize,
        backoff: BackoffConfig,
    ) -> Result<Self, BusError> {
        let client = redis::Client::open(url).map_err(connection_error)?;
        let publisher = client
            .get_multiplexed_async_connection()
            .await
            .map_err(connection_error)?;

        Ok(Self {
            client,
            publisher,
            capacity: capacity.max(1),
            backoff,
        })
    }

    /// Shared handle.
    #[must_use]
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

fn connection_error(e: redis::RedisError) -> BusError {
    BusError::Connection {
        message: e.to_string(),
    }
}

async fn open_pubsub(client: &redis::Client, topics: &[String]) -> Result<PubSub, BusError> {
    let mut pubsub = client.get_async_pubsub().await.map_err(connection_error)?;
    for topic in topics {
        pubsub
            .subscribe(topic.as_str())
            .await
            .map_err(|e| BusError::Subscribe {
                message: format!("{topic}: {e}"),
            })?;
    }
    Ok(pubsub)
}

#[async_trait]
impl MessageBus for RedisBus {
    async fn publish(&self, topic: &str, payload: &[u8]) {
        let mut conn = self.publisher.clone();
        let result: redis::RedisResult<()> = conn.publish(topic, payload).await;
        if let Err(e) = result {
            warn!(topic, error = %e, "Publish failed, message dropped");
            metrics::record_publish_failure(topic);
        }
    }

    async fn subscribe(&self, topics: &[&str]) -> Result<Subscription, BusError> {
        if topics.is_empty() {
            return Err(BusError::Subscribe {
                message: "no topics given".to_string(),
            });
        }

        let topics: Vec<String> = topics.iter().map(|t| (*t).to_string()).collect();
        let pubsub = open_pubsub(&self.client, &topics).await?;
        info!(topics = ?topics, "Subscribed");

        let (tx, rx) = mpsc::channel(self.capacity);
        let cancel = CancellationToken::new();

        tokio::spawn(forward(
            self.client.clone(),
            topics,
            pubsub,
            tx,
            Backoff::new(self.backoff.clone()),
            cancel.clone(),
        ));

        Ok(Subscription::new(rx, cancel))
    }
}

async fn forward(
    client: redis::Client,
    topics: Vec<String>,
    mut pubsub: PubSub,
    tx: mpsc::Sender<RawMessage>,
    mut backoff: Backoff,
    cancel: CancellationToken,
) {
    loop {
        {
            let mut messages = pubsub.on_message();
            loop {
                let next = tokio::select! {
                    () = cancel.cancelled() => return,
                    next = messages.next() => next,
                };
                let Some(msg) = next else { break };

                let raw = RawMessage::new(msg.get_channel_name(), msg.get_payload_bytes());
                tokio::select! {
                    () = cancel.cancelled() => return,
                    sent = tx.send(raw) => if sent.is_err() { return },
                }
            }
        }

        warn!(topics = ?topics, "Subscription connection lost, reconnecting");

        pubsub = loop {
            if !backoff.wait(&cancel).await {
                return;
            }
            match open_pubsub(&client, &topics).await {
                Ok(pubsub) => {
                    metrics::record_reconnect();
                    info!(attempts = backoff.attempts(), "Subscription re-established");
                    backoff.reset();
                    break pubsub;
                }
                Err(e) => debug!(error = %e, "Reconnect attempt failed"),
            }
        };
    }
}
