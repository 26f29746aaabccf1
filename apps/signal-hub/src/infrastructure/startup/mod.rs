//! Startup Dependency Waits
//!
//! Blocks startup until Redis and InfluxDB answer, retrying on a fixed
//! interval. There is no attempt limit; the wait ends when the dependency
//! answers or the shutdown token fires.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::ports::TimeSeriesWriter;

/// Probe `check` every `interval` until it succeeds.
///
/// Returns `true` once reachable, `false` if cancelled first.
pub async fn wait_until_reachable<F, Fut, E>(
    name: &str,
    interval: Duration,
    cancel: &CancellationToken,
    mut check: F,
) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let mut attempts: u32 = 0;

    loop {
        let result = tokio::select! {
            () = cancel.cancelled() => return false,
            result = check() => result,
        };

        attempts = attempts.saturating_add(1);
        match result {
            Ok(()) => {
                info!(dependency = name, attempts, "Dependency reachable");
                return true;
            }
            Err(e) if attempts == 1 => {
                warn!(dependency = name, error = %e, "Dependency unreachable, waiting");
            }
            Err(e) => debug!(dependency = name, attempts, error = %e, "Still unreachable"),
        }

        tokio::select! {
            () = cancel.cancelled() => return false,
            () = tokio::time::sleep(interval) => {}
        }
    }
}

/// Wait until Redis at `url` answers `PING`.
///
/// # Errors
///
/// Returns the client error if `url` is not a valid Redis URL.
pub async fn wait_for_redis(
    url: &str,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<bool, redis::RedisError> {
    let client = redis::Client::open(url)?;

    Ok(wait_until_reachable("redis", interval, cancel, || {
        let client = client.clone();
        async move {
            let mut conn = client.get_multiplexed_async_connection().await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<(), redis::RedisError>(())
        }
    })
    .await)
}

/// Wait until the time-series backend reports healthy.
pub async fn wait_for_influx(
    writer: &dyn TimeSeriesWriter,
    interval: Duration,
    cancel: &CancellationToken,
) -> bool {
    wait_until_reachable("influxdb", interval, cancel, || writer.ping()).await
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::application::ports::{MockTimeSeriesWriter, SinkError};

    #[tokio::test(start_paused = true)]
    async fn retries_on_fixed_interval_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let start = tokio::time::Instant::now();

        let reachable = wait_until_reachable(
            "test",
            Duration::from_secs(3),
            &CancellationToken::new(),
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move { if n < 2 { Err("down") } else { Ok(()) } }
            },
        )
        .await;

        assert!(reachable);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_waiting() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            trigger.cancel();
        });

        let reachable = wait_until_reachable("test", Duration::from_secs(1), &cancel, || async {
            Err::<(), _>("down")
        })
        .await;
        assert!(!reachable);
    }

    #[tokio::test(start_paused = true)]
    async fn influx_wait_uses_ping() {
        let mut writer = MockTimeSeriesWriter::new();
        let mut seq = mockall::Sequence::new();
        writer
            .expect_ping()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                Err(SinkError::Request {
                    message: "refused".to_string(),
                })
            });
        writer
            .expect_ping()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        assert!(wait_for_influx(&writer, Duration::from_secs(3), &CancellationToken::new()).await);
    }

    #[tokio::test]
    async fn invalid_redis_url_is_an_error() {
        let result = wait_for_redis("not a url", Duration::from_secs(1), &CancellationToken::new()).await;
        assert!(result.is_err());
    }
}
