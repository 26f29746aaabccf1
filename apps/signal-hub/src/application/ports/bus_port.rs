//! Message Bus Port (Driven Port)
//!
//! Interface for the publish/subscribe transport feeds and consumers share.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Unit of transport on the bus. The payload is opaque to the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Channel the message was published on.
    pub topic: String,
    /// Encoded document, UTF-8 JSON by convention.
    pub payload: Vec<u8>,
}

impl RawMessage {
    /// Create a raw message.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Bus error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BusError {
    /// The transport could not be reached.
    #[error("Bus connection error: {message}")]
    Connection {
        /// Error details.
        message: String,
    },

    /// The transport refused a subscription.
    #[error("Bus subscribe failed: {message}")]
    Subscribe {
        /// Error details.
        message: String,
    },
}

/// A live subscription: an ordered sequence of raw messages.
///
/// Adapters feed the sequence from a background task through a bounded
/// channel. Dropping or closing the subscription stops that task; once the
/// task is gone the sequence ends.
#[derive(Debug)]
pub struct Subscription {
    receiver: mpsc::Receiver<RawMessage>,
    cancel: CancellationToken,
}

impl Subscription {
    /// Build a subscription from the receiving half of an adapter's channel
    /// and the token that stops the adapter's forwarding task.
    #[must_use]
    pub const fn new(receiver: mpsc::Receiver<RawMessage>, cancel: CancellationToken) -> Self {
        Self { receiver, cancel }
    }

    /// Wait for the next message.
    ///
    /// Returns `None` once the subscription is closed and drained.
    pub async fn next_message(&mut self) -> Option<RawMessage> {
        self.receiver.recv().await
    }

    /// Stop delivery. Idempotent; buffered messages may still be drained.
    pub fn close(&mut self) {
        self.cancel.cancel();
        self.receiver.close();
    }

    /// Whether `close` was called or the adapter stopped the subscription.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for Subscription {
    type Item = RawMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Port for the publish/subscribe transport.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish a payload on a topic.
    ///
    /// Fire-and-forget: a transport failure is logged and counted by the
    /// adapter and never surfaced to the caller.
    async fn publish(&self, topic: &str, payload: &[u8]);

    /// Subscribe to one or more topics.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] if the initial subscription cannot be set up.
    async fn subscribe(&self, topics: &[&str]) -> Result<Subscription, BusError>;
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn subscription_yields_in_order_then_ends() {
        let (tx, rx) = mpsc::channel(4);
        let mut sub = Subscription::new(rx, CancellationToken::new());

        tx.send(RawMessage::new("a", b"1".to_vec())).await.unwrap();
        tx.send(RawMessage::new("a", b"2".to_vec())).await.unwrap();
        drop(tx);

        assert_eq!(sub.next_message().await.unwrap().payload, b"1");
        assert_eq!(sub.next().await.unwrap().payload, b"2");
        assert!(sub.next_message().await.is_none());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_cancels() {
        let (_tx, rx) = mpsc::channel(1);
        let token = CancellationToken::new();
        let mut sub = Subscription::new(rx, token.clone());

        sub.close();
        sub.close();

        assert!(token.is_cancelled());
        assert!(sub.is_closed());
        assert!(sub.next_message().await.is_none());
    }

    #[test]
    fn drop_cancels_forwarder() {
        let (_tx, rx) = mpsc::channel(1);
        let token = CancellationToken::new();
        drop(Subscription::new(rx, token.clone()));
        assert!(token.is_cancelled());
    }
}
