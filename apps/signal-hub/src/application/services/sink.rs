//! Sink Writer
//!
//! Buffers normalized points and writes them to the time-series backend in
//! batches. A batch is flushed when the buffer is full and a new point
//! arrives, or when the owner calls `flush` (interval tick, shutdown).
//!
//! Failed writes are not retried. The batch is logged, counted and dropped.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error};

use crate::application::ports::{SinkError, TimeSeriesWriter};
use crate::domain::point::NormalizedPoint;
use crate::infrastructure::metrics;

/// Default number of points per backend write.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Batching front of a [`TimeSeriesWriter`].
pub struct SinkWriter {
    writer: Arc<dyn TimeSeriesWriter>,
    batch_size: usize,
    buffer: Vec<NormalizedPoint>,
}

impl std::fmt::Debug for SinkWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkWriter")
            .field("batch_size", &self.batch_size)
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl SinkWriter {
    /// Create a writer flushing every `batch_size` points (at least one).
    #[must_use]
    pub fn new(writer: Arc<dyn TimeSeriesWriter>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            writer,
            batch_size,
            buffer: Vec::with_capacity(batch_size),
        }
    }

    /// Buffer a point, flushing the full buffer first if needed.
    ///
    /// Returns the number of points flushed by this call. The point is
    /// buffered even if the preceding flush failed.
    ///
    /// # Errors
    ///
    /// Returns the [`SinkError`] of the flush triggered by this call.
    pub async fn write(&mut self, point: NormalizedPoint) -> Result<usize, SinkError> {
        let flushed = if self.buffer.len() >= self.batch_size {
            self.flush().await
        } else {
            Ok(0)
        };
        self.buffer.push(point);
        flushed
    }

    /// Write every buffered point in one batch.
    ///
    /// Returns the number of points written. An empty buffer is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if the backend rejects the batch; the batch is
    /// dropped either way.
    pub async fn flush(&mut self) -> Result<usize, SinkError> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        let batch = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.batch_size));
        let count = batch.len();
        let start = Instant::now();

        match self.writer.write_batch(&batch).await {
            Ok(()) => {
                metrics::record_flush(count as u64, start.elapsed());
                debug!(points = count, "Flushed batch");
                Ok(count)
            }
            Err(e) => {
                metrics::record_write_failure(count as u64);
                error!(points = count, error = %e, "Batch write failed, dropping points");
                Err(e)
            }
        }
    }

    /// Points waiting for the next flush.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Configured batch size.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::application::ports::MockTimeSeriesWriter;
    use crate::domain::point::{FieldValue, Fields, Tags};

    fn point(n: f64) -> NormalizedPoint {
        NormalizedPoint::new(
            "m",
            Tags::new(),
            Fields::from([("v".to_string(), FieldValue::Float(n))]),
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn n_plus_one_points_flush_once() {
        let mut writer = MockTimeSeriesWriter::new();
        writer
            .expect_write_batch()
            .withf(|batch| batch.len() == 3)
            .times(1)
            .returning(|_| Ok(()));

        let mut sink = SinkWriter::new(Arc::new(writer), 3);
        let mut flushed = Vec::new();
        for n in 0..4 {
            flushed.push(sink.write(point(f64::from(n))).await.unwrap());
        }

        assert_eq!(flushed, vec![0, 0, 0, 3]);
        assert_eq!(sink.buffered(), 1);
    }

    #[tokio::test]
    async fn exactly_n_points_do_not_flush() {
        let mut writer = MockTimeSeriesWriter::new();
        writer.expect_write_batch().never();

        let mut sink = SinkWriter::new(Arc::new(writer), 2);
        sink.write(point(1.0)).await.unwrap();
        sink.write(point(2.0)).await.unwrap();
        assert_eq!(sink.buffered(), 2);
    }

    #[tokio::test]
    async fn failed_flush_drops_batch_and_keeps_new_point() {
        let mut writer = MockTimeSeriesWriter::new();
        writer.expect_write_batch().times(1).returning(|_| {
            Err(SinkError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            })
        });

        let mut sink = SinkWriter::new(Arc::new(writer), 1);
        sink.write(point(1.0)).await.unwrap();
        let err = sink.write(point(2.0)).await.unwrap_err();

        assert!(matches!(err, SinkError::Rejected { status: 503, .. }));
        assert_eq!(sink.buffered(), 1);
    }

    #[tokio::test]
    async fn flush_empty_is_noop() {
        let mut writer = MockTimeSeriesWriter::new();
        writer.expect_write_batch().never();

        let mut sink = SinkWriter::new(Arc::new(writer), 0);
        assert_eq!(sink.flush().await.unwrap(), 0);
        assert_eq!(sink.batch_size(), 1);
    }
}
