//! Price Table and Cache
//!
//! `PriceTable` is the in-process mirror of the latest USD price per symbol.
//! It is written only by the single refresh task owned by a `PriceCache` and
//! read concurrently by any number of feed processors.
//!
//! # Refresh Modes
//!
//! - **Poll**: every interval, bulk-read the keyed store and merge the read
//!   into the table under one write lock. Entries are never removed. A
//!   failed read leaves the table untouched; an unparsable value leaves
//!   that symbol's previous price in place.
//! - **Stream**: consume the price topic; each message overwrites only the
//!   symbols it names. Last write wins by arrival order.
//!
//! # Readiness
//!
//! The table is ready once every symbol of its `ReadinessSet` has an entry.
//! A present zero counts as an entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::ports::{BusError, MessageBus, PriceLookup, PriceStore, Subscription};
use crate::domain::price::{PriceUpdate, ReadinessSet};
use crate::infrastructure::metrics::{self, CacheMode};

/// Default poll interval for both the store refresh and the readiness wait.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3);

// =============================================================================
// Price Table
// =============================================================================

/// Latest USD price per symbol plus the readiness predicate over it.
#[derive(Debug)]
pub struct PriceTable {
    prices: RwLock<HashMap<String, f64>>,
    readiness: ReadinessSet,
    ready_poll: Duration,
}

impl PriceTable {
    /// Create an empty table.
    #[must_use]
    pub fn new(readiness: ReadinessSet, ready_poll: Duration) -> Self {
        Self {
            prices: RwLock::new(HashMap::new()),
            readiness,
            ready_poll,
        }
    }

    /// Latest known price, or `0.0` if the symbol was never observed.
    #[must_use]
    pub fn get_price(&self, symbol: &str) -> f64 {
        self.prices.read().get(symbol).copied().unwrap_or_default()
    }

    /// Whether every readiness symbol has an entry.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let prices = self.prices.read();
        self.readiness.iter().all(|s| prices.contains_key(s))
    }

    /// Readiness symbols that still have no entry.
    #[must_use]
    pub fn missing_symbols(&self) -> Vec<String> {
        let prices = self.prices.read();
        self.readiness
            .iter()
            .filter(|s| !prices.contains_key(*s))
            .map(str::to_string)
            .collect()
    }

    /// Block until the table is ready, re-checking on a fixed interval.
    ///
    /// There is no timeout: if the refresh source never delivers the
    /// readiness symbols this never returns.
    pub async fn wait_until_ready(&self) {
        loop {
            if self.is_ready() {
                return;
            }
            debug!(missing = ?self.missing_symbols(), "Price table not ready yet");
            tokio::time::sleep(self.ready_poll).await;
        }
    }

    /// Like [`Self::wait_until_ready`], but gives up when `cancel` fires.
    ///
    /// Returns `true` if the table became ready.
    pub async fn wait_until_ready_or_cancelled(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            () = self.wait_until_ready() => true,
            () = cancel.cancelled() => false,
        }
    }

    /// Overwrite the symbols named by `update`, leaving others untouched.
    ///
    /// Returns the number of assignments made.
    pub fn apply(&self, update: &PriceUpdate) -> usize {
        let mut prices = self.prices.write();
        let mut applied = 0;
        for price in update.prices() {
            prices.insert(price.symbol.clone(), price.price_usd);
            applied += 1;
        }
        applied
    }

    /// Overwrite every symbol in `prices` in one step. Symbols absent from
    /// `prices` keep their entry.
    ///
    /// Returns the number of assignments made.
    pub fn merge(&self, prices: HashMap<String, f64>) -> usize {
        let count = prices.len();
        self.prices.write().extend(prices);
        count
    }

    /// Point-in-time copy of every entry.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.prices.read().clone()
    }

    /// Number of symbols with an entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.prices.read().len()
    }

    /// Whether no symbol has an entry yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prices.read().is_empty()
    }

    /// The configured readiness set.
    #[must_use]
    pub const fn readiness(&self) -> &ReadinessSet {
        &self.readiness
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        Self::new(ReadinessSet::default(), DEFAULT_REFRESH_INTERVAL)
    }
}

impl PriceLookup for PriceTable {
    fn price(&self, symbol: &str) -> f64 {
        self.get_price(symbol)
    }
}

// =============================================================================
// Price Cache
// =============================================================================

/// Owner of a `PriceTable` and the background task that keeps it current.
///
/// The task runs until `close` is called or the token passed at
/// construction is cancelled.
#[derive(Debug)]
pub struct PriceCache {
    table: Arc<PriceTable>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PriceCache {
    /// Start a poll-mode cache reading `store` every `interval`.
    ///
    /// The first read happens immediately.
    #[must_use]
    pub fn poll(
        table: Arc<PriceTable>,
        store: Arc<dyn PriceStore>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let task = tokio::spawn(run_poll(
            Arc::clone(&table),
            store,
            interval,
            cancel.clone(),
        ));
        info!(interval_ms = interval.as_millis(), "Price cache started in poll mode");

        Self {
            table,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Start a stream-mode cache consuming `topic` on `bus`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] if the subscription cannot be established.
    pub async fn stream(
        table: Arc<PriceTable>,
        bus: &dyn MessageBus,
        topic: &str,
        cancel: CancellationToken,
    ) -> Result<Self, BusError> {
        let subscription = bus.subscribe(&[topic]).await?;
        let task = tokio::spawn(run_stream(Arc::clone(&table), subscription, cancel.clone()));
        info!(topic, "Price cache started in stream mode");

        Ok(Self {
            table,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    /// Shared handle to the table.
    #[must_use]
    pub const fn table(&self) -> &Arc<PriceTable> {
        &self.table
    }

    /// Stop the refresh task and release its transport. Idempotent.
    pub async fn close(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Price cache task ended abnormally");
            }
        }
    }
}

impl Drop for PriceCache {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_poll(
    table: Arc<PriceTable>,
    store: Arc<dyn PriceStore>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match store.read_all().await {
            Ok(hash) => {
                for invalid in &hash.invalid {
                    warn!(error = %invalid, "Skipping stored price");
                }
                metrics::record_invalid_prices(hash.invalid.len() as u64);

                let count = table.merge(hash.prices);
                metrics::record_price_updates(CacheMode::Poll, count as u64);
                metrics::set_price_table_size(table.len() as f64);
            }
            Err(e) => {
                warn!(error = %e, "Price refresh failed, keeping previous table");
                metrics::record_price_refresh_failure(CacheMode::Poll);
            }
        }
    }

    debug!("Price poll task stopped");
}

async fn run_stream(table: Arc<PriceTable>, mut subscription: Subscription, cancel: CancellationToken) {
    loop {
        let message = tokio::select! {
            () = cancel.cancelled() => break,
            message = subscription.next_message() => message,
        };

        let Some(message) = message else {
            warn!("Price subscription ended");
            break;
        };

        match PriceUpdate::from_slice(&message.payload) {
            Ok(update) => {
                let applied = table.apply(&update);
                metrics::record_price_updates(CacheMode::Stream, applied as u64);
                metrics::set_price_table_size(table.len() as f64);
            }
            Err(e) => {
                debug!(topic = %message.topic, error = %e, "Skipping undecodable price update");
                metrics::record_price_refresh_failure(CacheMode::Stream);
            }
        }
    }

    subscription.close();
    debug!("Price stream task stopped");
}
