//! Reconnect Backoff
//!
//! Exponential backoff with symmetric jitter for re-establishing a dropped
//! bus subscription. Attempts are unlimited; the caller stops retrying by
//! cancelling.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::config::BusSettings;

/// Backoff parameters.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on the un-jittered delay.
    pub max_delay: Duration,
    /// Growth factor per attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl From<&BusSettings> for BackoffConfig {
    fn from(settings: &BusSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            ..Self::default()
        }
    }
}

/// Stateful backoff sequence.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    attempts: u32,
}

impl Backoff {
    /// Start a fresh sequence.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, advancing the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.base_delay(self.attempts);
        self.attempts = self.attempts.saturating_add(1);
        self.jitter(base)
    }

    /// Wait out the next delay. Returns `false` if cancelled first.
    pub async fn wait(&mut self, cancel: &CancellationToken) -> bool {
        let delay = self.next_delay();
        tokio::select! {
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    /// Restart from the initial delay after a successful reconnect.
    pub const fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Attempts since the last reset.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let factor = self.config.multiplier.max(1.0).powi(exponent);
        let millis = self.config.initial_delay.as_secs_f64() * 1000.0 * factor;
        let cap = self.config.max_delay.as_secs_f64() * 1000.0;

        if !millis.is_finite() || millis >= cap {
            return self.config.max_delay;
        }
        Duration::from_secs_f64(millis / 1000.0)
    }

    fn jitter(&self, delay: Duration) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return delay;
        }

        let secs = delay.as_secs_f64();
        let spread = secs * self.config.jitter_factor;
        let offset: f64 = rand::rng().random_range(-spread..=spread);
        Duration::from_secs_f64((secs + offset).max(0.001))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(initial_ms: u64, max_ms: u64, multiplier: f64) -> Backoff {
        Backoff::new(BackoffConfig {
            initial_delay: Duration::from_millis(initial_ms),
            max_delay: Duration::from_millis(max_ms),
            multiplier,
            jitter_factor: 0.0,
        })
    }

    #[test]
    fn grows_geometrically() {
        let mut backoff = exact(100, 10_000, 2.0);
        let delays: Vec<_> = (0..4).map(|_| backoff.next_delay().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800]);
        assert_eq!(backoff.attempts(), 4);
    }

    #[test]
    fn caps_at_max_delay() {
        let mut backoff = exact(1000, 2000, 4.0);
        let _ = backoff.next_delay();
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(2000));
    }

    #[test]
    fn survives_many_attempts() {
        let mut backoff = exact(100, 5000, 2.0);
        for _ in 0..10_000 {
            assert!(backoff.next_delay() <= Duration::from_millis(5000));
        }
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut backoff = exact(100, 10_000, 2.0);
        let _ = backoff.next_delay();
        let _ = backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn jitter_stays_in_bounds() {
        for _ in 0..100 {
            let mut backoff = Backoff::new(BackoffConfig {
                initial_delay: Duration::from_millis(1000),
                jitter_factor: 0.1,
                ..BackoffConfig::default()
            });
            let millis = backoff.next_delay().as_millis();
            assert!((900..=1100).contains(&millis), "delay {millis}ms out of bounds");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wait_stops_on_cancel() {
        let mut backoff = exact(60_000, 60_000, 1.0);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(!backoff.wait(&cancel).await);
    }
}
