//! InfluxDB v2 Writer
//!
//! Implements `TimeSeriesWriter` over the v2 HTTP API: one
//! `POST /api/v2/write` per batch, token-authenticated, nanosecond precision.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::line_protocol::encode_batch;
use crate::application::ports::{SinkError, TimeSeriesWriter};
use crate::domain::point::NormalizedPoint;
use crate::infrastructure::config::InfluxSettings;

/// Request timeout for writes and health checks.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_ERROR_BODY: usize = 512;

/// Line-protocol writer for InfluxDB v2.
#[derive(Clone)]
pub struct InfluxWriter {
    client: Client,
    write_url: String,
    health_url: String,
    org: String,
    bucket: String,
    token: String,
}

impl std::fmt::Debug for InfluxWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfluxWriter")
            .field("write_url", &self.write_url)
            .field("org", &self.org)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl InfluxWriter {
    /// Create a writer for the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Request`] if the HTTP client cannot be built.
    pub fn new(settings: &InfluxSettings, timeout: Duration) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(request_error)?;

        let base = settings.url.trim_end_matches('/');
        Ok(Self {
            client,
            write_url: format!("{base}/api/v2/write"),
            health_url: format!("{base}/health"),
            org: settings.org.clone(),
            bucket: settings.bucket.clone(),
            token: settings.token().to_string(),
        })
    }
}

fn request_error(e: reqwest::Error) -> SinkError {
    SinkError::Request {
        message: e.to_string(),
    }
}

async fn rejected(response: reqwest::Response) -> SinkError {
    let status = response.status().as_u16();
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    SinkError::Rejected { status, body }
}

#[async_trait]
impl TimeSeriesWriter for InfluxWriter {
    async fn write_batch(&self, points: &[NormalizedPoint]) -> Result<(), SinkError> {
        let body = encode_batch(points);
        if body.is_empty() {
            tracing::debug!(points = points.len(), "Nothing writable in batch");
            return Ok(());
        }

        let response = self
            .client
            .post(&self.write_url)
            .query(&[
                ("org", self.org.as_str()),
                ("bucket", self.bucket.as_str()),
                ("precision", "ns"),
            ])
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(request_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(rejected(response).await)
        }
    }

    async fn ping(&self) -> Result<(), SinkError> {
        let response = self
            .client
            .get(&self.health_url)
            .send()
            .await
            .map_err(request_error)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(rejected(response).await)
        }
    }
}
