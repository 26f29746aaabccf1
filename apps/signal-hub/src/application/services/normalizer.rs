//! Topic Normalizer
//!
//! Routes a raw bus message to the handler for its topic and turns the
//! decoded payload into uniform time-series points.
//!
//! # Outcomes
//!
//! | Input                          | Result                          |
//! |--------------------------------|---------------------------------|
//! | known topic, valid payload     | `Ok(Points)`, usually one       |
//! | conversion price unknown       | `Ok(Suppressed)`                |
//! | payload does not fit schema    | `Err(Decode)`, drop the message |
//! | topic outside the catalogue    | `Err(UnknownTopic)`, fatal      |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::application::ports::{PriceLookup, RawMessage};
use crate::domain::feeds::{
    BlockHeaderRecord, CandlestickRecord, DecodeError, GasPriceRecord, GlobalMetricsRecord,
    TopicPayload,
};
use crate::domain::point::{
    FieldValue, Fields, NormalizedPoint, PointError, Tags, from_unix_millis, from_unix_secs,
};
use crate::domain::price::PriceUpdate;
use crate::domain::topic::{Topic, UnknownTopic};
use crate::infrastructure::metrics;

/// Symbol whose price converts wei and block rewards into USD.
pub const ETH_SYMBOL: &str = "ETH";

/// Gas units consumed by a plain value transfer.
pub const TRANSFER_GAS: f64 = 21_000.0;

const WEI_PER_ETH: f64 = 1e18;

/// Normalization error.
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    /// The payload does not match its topic's schema.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The decoded payload cannot form a valid point.
    #[error(transparent)]
    Point(#[from] PointError),

    /// The message arrived on a topic the router does not know.
    #[error(transparent)]
    UnknownTopic(#[from] UnknownTopic),
}

impl NormalizeError {
    /// Whether the error indicates a wiring defect rather than bad data.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::UnknownTopic(_))
    }
}

/// USD cost of a plain transfer at `wei` per gas unit.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn gas_cost_usd(wei: u64, eth_price: f64) -> f64 {
    wei as f64 / WEI_PER_ETH * TRANSFER_GAS * eth_price
}

/// Result of normalizing one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// Points to write. An empty price batch yields none.
    Points(Vec<NormalizedPoint>),
    /// Held back because the ETH conversion price is not known yet.
    Suppressed,
}

impl Normalized {
    fn single(point: Option<NormalizedPoint>) -> Self {
        point.map_or(Self::Suppressed, |point| Self::Points(vec![point]))
    }

    /// Whether the message was held back for lack of a price.
    #[must_use]
    pub const fn is_suppressed(&self) -> bool {
        matches!(self, Self::Suppressed)
    }

    /// The emitted points; empty when suppressed.
    #[must_use]
    pub fn points(&self) -> &[NormalizedPoint] {
        match self {
            Self::Points(points) => points,
            Self::Suppressed => &[],
        }
    }

    /// Consume into the emitted points.
    #[must_use]
    pub fn into_points(self) -> Vec<NormalizedPoint> {
        match self {
            Self::Points(points) => points,
            Self::Suppressed => Vec::new(),
        }
    }
}

/// Topic-keyed dispatch from raw payloads to normalized points.
#[derive(Clone)]
pub struct Normalizer {
    prices: Arc<dyn PriceLookup>,
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer").finish_non_exhaustive()
    }
}

impl Normalizer {
    /// Create a normalizer reading conversion prices from `prices`.
    #[must_use]
    pub fn new(prices: Arc<dyn PriceLookup>) -> Self {
        Self { prices }
    }

    /// Normalize a raw bus message.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizeError::UnknownTopic`] if the topic is not in the
    /// catalogue, or a decode/point error if the payload is malformed.
    pub fn normalize(&self, message: &RawMessage) -> Result<Normalized, NormalizeError> {
        let topic: Topic = message.topic.parse()?;
        self.normalize_topic(topic, &message.payload)
    }

    /// Normalize a payload already routed to `topic`.
    ///
    /// # Errors
    ///
    /// Returns a decode or point error if the payload is malformed.
    pub fn normalize_topic(
        &self,
        topic: Topic,
        payload: &[u8],
    ) -> Result<Normalized, NormalizeError> {
        let normalized = match TopicPayload::decode(topic, payload)? {
            TopicPayload::GasPrice(record) => Normalized::single(self.gas_price(topic, &record)?),
            TopicPayload::BlockHeader(record) => {
                Normalized::single(self.block_header(topic, record)?)
            }
            TopicPayload::Candlestick(record) => {
                Normalized::Points(vec![candlestick(topic, record)?])
            }
            TopicPayload::GlobalMetrics(record) => {
                Normalized::Points(vec![global_metrics(topic, record)?])
            }
            TopicPayload::CurrencyPrice(update) => {
                Normalized::Points(currency_prices(topic, update)?)
            }
        };

        if normalized.is_suppressed() {
            metrics::record_point_suppressed(topic);
        }
        Ok(normalized)
    }

    fn eth_price(&self) -> Option<f64> {
        let price = self.prices.price(ETH_SYMBOL);
        (price > 0.0).then_some(price)
    }

    fn gas_price(
        &self,
        topic: Topic,
        record: &GasPriceRecord,
    ) -> Result<Option<NormalizedPoint>, NormalizeError> {
        let Some(eth_price) = self.eth_price() else {
            return Ok(None);
        };
        let timestamp = millis(record.timestamp)?;

        let fields = Fields::from([
            ("rapid".to_string(), gas_cost_usd(record.rapid, eth_price).into()),
            ("fast".to_string(), gas_cost_usd(record.fast, eth_price).into()),
            ("standard".to_string(), gas_cost_usd(record.standard, eth_price).into()),
            ("slow".to_string(), gas_cost_usd(record.slow, eth_price).into()),
            ("eth_price".to_string(), eth_price.into()),
        ]);

        Ok(Some(NormalizedPoint::new(
            topic.measurement(),
            Tags::new(),
            fields,
            timestamp,
        )?))
    }

    #[allow(clippy::cast_precision_loss)]
    fn block_header(
        &self,
        topic: Topic,
        record: BlockHeaderRecord,
    ) -> Result<Option<NormalizedPoint>, NormalizeError> {
        let reward_usd = match record.reward_usd {
            Some(usd) if usd > 0.0 => usd,
            _ => match self.eth_price() {
                Some(eth_price) => record.reward * eth_price,
                None => return Ok(None),
            },
        };
        let timestamp = from_unix_secs(record.timestamp)
            .ok_or_else(|| DecodeError::InvalidTimestamp(record.timestamp.to_string()))?;

        let fields = Fields::from([
            ("number".to_string(), (record.number as f64).into()),
            ("miner".to_string(), FieldValue::Text(record.miner)),
            ("gasLimit".to_string(), (record.gas_limit as f64).into()),
            ("gasUsed".to_string(), (record.gas_used as f64).into()),
            ("reward".to_string(), record.reward.into()),
            ("reward_usd".to_string(), reward_usd.into()),
        ]);

        Ok(Some(NormalizedPoint::new(
            topic.measurement(),
            Tags::new(),
            fields,
            timestamp,
        )?))
    }
}

fn millis(value: i64) -> Result<DateTime<Utc>, DecodeError> {
    from_unix_millis(value).ok_or_else(|| DecodeError::InvalidTimestamp(value.to_string()))
}

/// Keep numeric values, dropping strings, booleans, nulls and nested values.
fn numeric_fields(values: impl IntoIterator<Item = (String, Value)>) -> Fields {
    values
        .into_iter()
        .filter_map(|(key, value)| value.as_f64().map(|v| (key, FieldValue::Float(v))))
        .collect()
}

fn candlestick(topic: Topic, record: CandlestickRecord) -> Result<NormalizedPoint, NormalizeError> {
    let (base, quote) = record
        .pair
        .split_once('/')
        .filter(|(b, q)| !b.is_empty() && !q.is_empty())
        .ok_or_else(|| DecodeError::InvalidPair(record.pair.clone()))?;

    let tags = Tags::from([
        ("exchange".to_string(), record.exchange),
        ("market_type".to_string(), record.market_type),
        ("symbol".to_string(), record.symbol),
        ("base".to_string(), base.to_string()),
        ("quote".to_string(), quote.to_string()),
        ("bar_size".to_string(), record.bar_size.to_string()),
        ("pair".to_string(), record.pair.clone()),
    ]);

    let mut fields = numeric_fields(record.values);
    fields.retain(|key, _| !tags.contains_key(key));

    Ok(NormalizedPoint::new(
        topic.measurement(),
        tags,
        fields,
        millis(record.timestamp)?,
    )?)
}

fn global_metrics(
    topic: Topic,
    record: GlobalMetricsRecord,
) -> Result<NormalizedPoint, NormalizeError> {
    let timestamp = DateTime::parse_from_rfc3339(&record.last_updated)
        .map_err(|_| DecodeError::InvalidTimestamp(record.last_updated.clone()))?
        .with_timezone(&Utc);

    Ok(NormalizedPoint::new(
        topic.measurement(),
        Tags::new(),
        numeric_fields(record.values),
        timestamp,
    )?)
}

fn currency_prices(
    topic: Topic,
    update: PriceUpdate,
) -> Result<Vec<NormalizedPoint>, NormalizeError> {
    update
        .into_prices()
        .into_iter()
        .map(|price| {
            let point = NormalizedPoint::new(
                topic.measurement(),
                Tags::from([("symbol".to_string(), price.symbol)]),
                Fields::from([("price_usd".to_string(), price.price_usd.into())]),
                price.observed_at,
            )?;
            Ok(point)
        })
        .collect()
}
