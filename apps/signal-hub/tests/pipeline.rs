//! Pipeline Integration Tests
//!
//! Drives bus messages through the normalizer, the sink writer and the
//! shipper loop, with the backend replaced by a recording writer or a
//! mock InfluxDB server.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use signal_hub::domain::topic::{
    TOPIC_CANDLESTICK, TOPIC_CURRENCY_PRICE, TOPIC_ETH_GAS_PRICE,
};
use signal_hub::{
    AssetPrice, InMemoryBus, InfluxSettings, InfluxWriter, MessageBus, NormalizedPoint, Normalizer,
    PriceLookup, PriceTable, PriceUpdate, RawMessage, ReadinessSet, Shipper, SinkError,
    SinkWriter, TimeSeriesWriter,
};

// =============================================================================
// Fixtures
// =============================================================================

/// Writer that keeps every batch it is handed.
#[derive(Debug, Default)]
struct RecordingWriter {
    batches: Mutex<Vec<Vec<NormalizedPoint>>>,
}

impl RecordingWriter {
    fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().iter().map(Vec::len).collect()
    }

    fn points(&self) -> Vec<NormalizedPoint> {
        self.batches.lock().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl TimeSeriesWriter for RecordingWriter {
    async fn write_batch(&self, points: &[NormalizedPoint]) -> Result<(), SinkError> {
        self.batches.lock().push(points.to_vec());
        Ok(())
    }

    async fn ping(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

fn priced_table(eth: Option<f64>) -> Arc<PriceTable> {
    let table = Arc::new(PriceTable::new(ReadinessSet::empty(), Duration::from_secs(3)));
    if let Some(eth) = eth {
        table.apply(&PriceUpdate::Single(AssetPrice::new("ETH", eth)));
    }
    table
}

fn normalizer(table: &Arc<PriceTable>) -> Normalizer {
    let lookup: Arc<dyn PriceLookup> = Arc::clone(table) as Arc<dyn PriceLookup>;
    Normalizer::new(lookup)
}

const GAS: &str =
    r#"{"rapid":20000000000,"fast":15000000000,"standard":10000000000,"slow":5000000000,"timestamp":1700000000000}"#;

const CANDLE: &str = r#"{"exchange":"binance","market_type":"spot","symbol":"BTCUSDT","pair":"BTC/USDT","bar_size":60,"timestamp":1700000000000,"open":1.0,"high":2.0,"low":0.5,"close":1.5,"volume":10}"#;

async fn eventually(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// =============================================================================
// Normalizer
// =============================================================================

#[test]
fn gas_price_is_priced_in_usd() {
    let points = normalizer(&priced_table(Some(2000.0)))
        .normalize(&RawMessage::new(TOPIC_ETH_GAS_PRICE, GAS))
        .unwrap()
        .into_points();

    assert_eq!(points.len(), 1);
    let rapid = points[0].float_field("rapid").unwrap();
    assert!((rapid - 0.84).abs() < 1e-9);
    assert_eq!(points[0].float_field("eth_price"), Some(2000.0));
}

#[test]
fn gas_price_without_eth_is_suppressed() {
    let normalized = normalizer(&priced_table(None))
        .normalize(&RawMessage::new(TOPIC_ETH_GAS_PRICE, GAS))
        .unwrap();
    assert!(normalized.is_suppressed());
}

#[test]
fn candlestick_splits_pair_into_tags() {
    let points = normalizer(&priced_table(None))
        .normalize(&RawMessage::new(TOPIC_CANDLESTICK, CANDLE))
        .unwrap()
        .into_points();

    let point = &points[0];
    assert_eq!(point.measurement(), "candlestick");
    assert_eq!(point.tags()["base"], "BTC");
    assert_eq!(point.tags()["quote"], "USDT");
    assert_eq!(point.tags()["exchange"], "binance");
    assert_eq!(point.float_field("close"), Some(1.5));
    assert_eq!(point.float_field("volume"), Some(10.0));
    assert!(point.float_field("bar_size").is_none());
}

#[test]
fn unrouted_topic_is_fatal() {
    let err = normalizer(&priced_table(None))
        .normalize(&RawMessage::new("market:unknown", "{}"))
        .unwrap_err();
    assert!(err.is_fatal());
}

// =============================================================================
// Sink Writer
// =============================================================================

#[tokio::test]
async fn sink_flushes_once_after_batch_size_plus_one_points() {
    let writer = Arc::new(RecordingWriter::default());
    let mut sink = SinkWriter::new(Arc::clone(&writer) as Arc<dyn TimeSeriesWriter>, 3);
    let normalizer = normalizer(&priced_table(None));

    for _ in 0..4 {
        let point = normalizer
            .normalize(&RawMessage::new(TOPIC_CANDLESTICK, CANDLE))
            .unwrap()
            .into_points()
            .remove(0);
        sink.write(point).await.unwrap();
    }

    assert_eq!(writer.batch_sizes(), vec![3]);
    assert_eq!(sink.buffered(), 1);

    sink.flush().await.unwrap();
    assert_eq!(writer.batch_sizes(), vec![3, 1]);
}

// =============================================================================
// Shipper
// =============================================================================

#[tokio::test]
async fn shipper_moves_bus_messages_to_the_backend() {
    let bus = Arc::new(InMemoryBus::new(64));
    let writer = Arc::new(RecordingWriter::default());
    let table = priced_table(Some(2000.0));

    let shipper = Shipper::new(
        normalizer(&table),
        SinkWriter::new(Arc::clone(&writer) as Arc<dyn TimeSeriesWriter>, 32),
        Duration::from_secs(60),
    );
    let stats = shipper.stats();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(shipper.run(Arc::clone(&bus) as Arc<dyn MessageBus>, cancel.clone()));

    eventually(|| bus.subscriber_count() == 1).await;
    bus.publish(TOPIC_ETH_GAS_PRICE, GAS.as_bytes()).await;
    bus.publish(TOPIC_CANDLESTICK, CANDLE.as_bytes()).await;
    bus.publish(
        TOPIC_CURRENCY_PRICE,
        br#"[{"symbol":"BTC","price_usd":100.0},{"symbol":"ETH","price_usd":50.0}]"#,
    )
    .await;
    bus.publish(TOPIC_ETH_GAS_PRICE, b"not json").await;
    bus.publish("market:ignored", b"{}").await;

    eventually(|| stats.snapshot().received == 4).await;
    cancel.cancel();
    task.await.unwrap().unwrap();

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.emitted, 4);
    assert_eq!(snapshot.decode_failures, 1);
    assert_eq!(snapshot.written, 4);

    let mut measurements: Vec<_> = writer
        .points()
        .iter()
        .map(|p| p.measurement().to_string())
        .collect();
    measurements.sort();
    assert_eq!(
        measurements,
        vec![
            "candlestick",
            "currency_price",
            "currency_price",
            "eth_gas_price"
        ]
    );
}

#[tokio::test]
async fn shipper_writes_line_protocol_to_influxdb() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/write"))
        .and(query_param("org", "hub"))
        .and(query_param("bucket", "signals"))
        .and(query_param("precision", "ns"))
        .and(header("authorization", "Token secret"))
        .and(body_string_contains("candlestick,bar_size=60,base=BTC"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let settings = InfluxSettings::new(
        server.uri(),
        "hub".to_string(),
        "signals".to_string(),
        "secret".to_string(),
    );
    let writer: Arc<dyn TimeSeriesWriter> =
        Arc::new(InfluxWriter::new(&settings, Duration::from_secs(5)).unwrap());

    let bus = Arc::new(InMemoryBus::new(64));
    let shipper = Shipper::new(
        normalizer(&priced_table(None)),
        SinkWriter::new(writer, 32),
        Duration::from_secs(60),
    );
    let stats = shipper.stats();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(shipper.run(Arc::clone(&bus) as Arc<dyn MessageBus>, cancel.clone()));

    eventually(|| bus.subscriber_count() == 1).await;
    bus.publish(TOPIC_CANDLESTICK, CANDLE.as_bytes()).await;
    eventually(|| stats.snapshot().emitted == 1).await;

    cancel.cancel();
    task.await.unwrap().unwrap();
    assert_eq!(stats.snapshot().written, 1);
}
