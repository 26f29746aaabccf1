//! Message Bus Adapters
//!
//! Implementations of the `MessageBus` port:
//!
//! - `InMemoryBus`: process-local fan-out over a tokio broadcast channel
//! - `RedisBus`: Redis pub/sub with automatic resubscription
//!
//! Both deliver through a bounded per-subscription queue, so a slow
//! consumer applies backpressure to its own forwarding task only.

pub mod memory;
pub mod reconnect;
pub mod redis_bus;

pub use memory::{InMemoryBus, SharedInMemoryBus};
pub use reconnect::{Backoff, BackoffConfig};
pub use redis_bus::RedisBus;
