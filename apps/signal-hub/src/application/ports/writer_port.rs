//! Time-Series Writer Port (Driven Port)
//!
//! Interface for the time-series backend that stores normalized points.

use async_trait::async_trait;

use crate::domain::point::NormalizedPoint;

/// Sink error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// The request did not complete.
    #[error("Time-series request failed: {message}")]
    Request {
        /// Error details.
        message: String,
    },

    /// The backend answered with a non-success status.
    #[error("Time-series backend rejected write ({status}): {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },
}

/// Port for batched time-series writes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TimeSeriesWriter: Send + Sync {
    /// Write a batch of points in one request.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the backend does not accept the batch.
    async fn write_batch(&self, points: &[NormalizedPoint]) -> Result<(), SinkError>;

    /// Check that the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the backend does not answer healthy.
    async fn ping(&self) -> Result<(), SinkError>;
}
