//! Ingest Pipeline Integration Tests
//!
//! Wires orchestrator, pipeline, router and publisher together against the
//! in-process vendor, the same way the binary does.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{AuthMode, MockVendor, eventually};
use parking_lot::Mutex;

use market_stream_ingest::domain::streaming::AggregateDetail;
use market_stream_ingest::{
    Connectivity, DistributionPublisher, EventDetail, EventRouter, FeedOrchestrator,
    FeedSettings, FrequencyKind, IngestPipeline, MarketEvent, PublisherConfig,
    PublishingProcessor, WebSocketSettings,
};

const WITHIN: Duration = Duration::from_secs(5);

struct Harness {
    orchestrator: FeedOrchestrator,
    router: Arc<EventRouter>,
    pipeline: Arc<IngestPipeline>,
    publisher: Arc<DistributionPublisher>,
    delivered: Arc<Mutex<Vec<MarketEvent>>>,
}

fn websocket() -> WebSocketSettings {
    WebSocketSettings {
        reconnect_delay_base: Duration::from_millis(50),
        reconnect_delay_max: Duration::from_millis(100),
        max_reconnect_attempts: 2,
        auth_timeout: Duration::from_millis(500),
        connect_timeout: Duration::from_secs(2),
        ..WebSocketSettings::default()
    }
}

fn harness(feeds: &FeedSettings) -> Harness {
    harness_with(feeds, &websocket())
}

fn harness_with(feeds: &FeedSettings, websocket: &WebSocketSettings) -> Harness {
    let publisher = Arc::new(DistributionPublisher::new(PublisherConfig::default(), None));
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&delivered);
    publisher.set_subscriber(Arc::new(move |event: &MarketEvent| {
        sink.lock().push(event.clone());
    }));

    let router = Arc::new(EventRouter::new());
    for frequency in feeds.enabled_frequencies() {
        router.register_processor(
            frequency,
            Arc::new(PublishingProcessor::new(Arc::clone(&publisher))),
        );
    }
    let pipeline = Arc::new(IngestPipeline::new(Arc::clone(&router)));
    let orchestrator =
        FeedOrchestrator::configure(feeds, websocket, Arc::clone(&pipeline) as _).unwrap();

    Harness {
        orchestrator,
        router,
        pipeline,
        publisher,
        delivered,
    }
}

fn per_second_only(vendor: &MockVendor) -> FeedSettings {
    FeedSettings {
        api_key: Some("test-key".to_string()),
        stocks_url: vendor.url().to_string(),
        ..FeedSettings::default()
    }
}

#[tokio::test]
async fn aggregate_flows_from_socket_to_publisher() {
    let vendor = MockVendor::start(AuthMode::Ack).await;
    let h = harness(&per_second_only(&vendor));

    assert!(h.orchestrator.connect().await);
    assert!(h.orchestrator.is_connected());
    assert_eq!(h.orchestrator.connectivity(), Connectivity::Full);
    assert!(h.orchestrator.connection(FrequencyKind::PerMinute).is_none());

    assert!(h.orchestrator.subscribe(&["aapl"], None).await);
    assert!(eventually(WITHIN, || vendor.requests("subscribe").len() == 1).await);
    assert_eq!(vendor.requests("subscribe")[0]["params"], "A.AAPL");

    vendor.push(
        r#"[{"ev":"A","sym":"AAPL","v":1200,"vw":189.9,"o":189.5,"c":190.25,"h":190.5,"l":189.4,"s":1699999999000,"e":1700000000000}]"#,
    );

    assert!(eventually(WITHIN, || h.router.stats(FrequencyKind::PerSecond).success == 1).await);
    assert_eq!(h.publisher.stats().published, 1);
    let delivered = h.delivered.lock().clone();
    assert_eq!(delivered.len(), 1);

    let event = &delivered[0];
    assert_eq!(event.symbol, "AAPL");
    assert_eq!(event.frequency, FrequencyKind::PerSecond);
    assert!((event.price - 190.25).abs() < f64::EPSILON);
    assert_eq!(event.volume, 1200);
    assert!((event.timestamp - 1_700_000_000.0).abs() < f64::EPSILON);
    assert!(matches!(
        &event.detail,
        EventDetail::Aggregate(bar) if (bar.window_start - 1_699_999_999.0).abs() < f64::EPSILON
    ));

    let routed = h.router.stats(FrequencyKind::PerSecond);
    assert_eq!(routed.routed, 1);
    assert_eq!(routed.success, 1);

    let buffered = h.publisher.drain();
    assert_eq!(buffered.len(), 1);
    assert_eq!(buffered[0].symbol, "AAPL");
    assert!(h.publisher.drain().is_empty());

    h.orchestrator.disconnect().await;
}

#[tokio::test]
async fn unregistered_frequency_is_not_routed() {
    let vendor = MockVendor::start(AuthMode::Ack).await;
    let h = harness(&per_second_only(&vendor));
    assert!(h.orchestrator.connect().await);

    let event = MarketEvent {
        symbol: "MSFT".to_string(),
        price: 370.0,
        volume: 10,
        timestamp: 1_700_000_000.0,
        frequency: FrequencyKind::PerMinute,
        detail: EventDetail::Aggregate(AggregateDetail {
            open: 369.0,
            high: 371.0,
            low: 368.5,
            close: 370.0,
            vwap: None,
            accumulated_volume: None,
            window_start: 1_699_999_940.0,
            window_end: 1_700_000_000.0,
        }),
    };

    assert!(!h.router.route(&event, FrequencyKind::PerMinute).await);
    assert_eq!(h.router.stats(FrequencyKind::PerSecond).routed, 0);
    assert_eq!(h.router.stats(FrequencyKind::PerMinute).routed, 0);
    assert_eq!(h.publisher.stats().published, 0);

    h.orchestrator.disconnect().await;
}

#[tokio::test]
async fn pipeline_tracks_channel_status() {
    let vendor = MockVendor::start(AuthMode::Ack).await;
    let h = harness(&per_second_only(&vendor));
    assert!(h.orchestrator.connect().await);

    assert!(
        eventually(WITHIN, || {
            h.pipeline
                .latest_status(FrequencyKind::PerSecond)
                .is_some_and(|s| s.state.is_live())
        })
        .await
    );

    h.orchestrator.disconnect().await;
    assert!(h.orchestrator.connection(FrequencyKind::PerSecond).is_none());
    assert_eq!(h.orchestrator.connectivity(), Connectivity::Down);
    assert!(!h.orchestrator.subscribe(&["AAPL"], None).await);

    let last = h.pipeline.latest_status(FrequencyKind::PerSecond).unwrap();
    assert!(!last.state.is_live());
}

#[tokio::test]
async fn one_dead_channel_leaves_the_others_streaming() {
    let vendor = MockVendor::start(AuthMode::Ack).await;
    let feeds = FeedSettings {
        enable_fair_value: true,
        fair_value_api_key: Some("fmv-key".to_string()),
        fair_value_url: "ws://127.0.0.1:1".to_string(),
        ..per_second_only(&vendor)
    };
    let h = harness(&feeds);

    assert!(h.orchestrator.connect().await);
    assert!(!h.orchestrator.is_connected());
    assert_eq!(
        h.orchestrator.connectivity(),
        Connectivity::Partial {
            live: vec![FrequencyKind::PerSecond],
            down: vec![FrequencyKind::FairValue],
        }
    );

    let fair_value = h.orchestrator.connection(FrequencyKind::FairValue).unwrap();
    assert!(eventually(WITHIN, || !fair_value.should_reconnect()).await);

    // Subscribing still reaches the live channel.
    assert!(h.orchestrator.subscribe(&["AAPL"], None).await);
    assert!(
        !h.orchestrator
            .subscribe(&["AAPL"], Some(&[FrequencyKind::FairValue]))
            .await
    );

    h.orchestrator.disconnect().await;
}

#[tokio::test]
async fn configured_symbols_reach_a_channel_that_goes_live_late() {
    let stocks = MockVendor::start(AuthMode::Ack).await;
    let fair_value = MockVendor::start(AuthMode::Reject).await;
    let feeds = FeedSettings {
        enable_fair_value: true,
        fair_value_api_key: Some("fmv-key".to_string()),
        fair_value_url: fair_value.url().to_string(),
        symbols: vec!["AAPL".to_string()],
        ..per_second_only(&stocks)
    };
    let websocket = WebSocketSettings {
        max_reconnect_attempts: 100,
        connect_timeout: Duration::from_millis(300),
        ..websocket()
    };
    let h = harness_with(&feeds, &websocket);

    assert!(h.orchestrator.connect().await);
    assert!(eventually(WITHIN, || stocks.requests("subscribe").len() == 1).await);
    assert_eq!(stocks.requests("subscribe")[0]["params"], "A.AAPL");
    assert!(fair_value.requests("subscribe").is_empty());

    fair_value.set_auth(AuthMode::Ack);

    assert!(eventually(WITHIN, || h.orchestrator.is_connected()).await);
    assert!(eventually(WITHIN, || fair_value.requests("subscribe").len() == 1).await);
    assert_eq!(fair_value.requests("subscribe")[0]["params"], "FMV.AAPL");
    assert_eq!(h.orchestrator.connectivity(), Connectivity::Full);

    h.orchestrator.disconnect().await;
}
