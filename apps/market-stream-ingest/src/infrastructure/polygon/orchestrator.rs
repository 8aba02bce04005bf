//! Feed Orchestrator
//!
//! Owns one [`ChannelConnection`] per enabled frequency and exposes them as a
//! single feed. Raw vendor messages are normalized into [`MarketEvent`]s here;
//! nothing past this module sees wire types.
//!
//! # Connectivity
//!
//! A channel failing does not take the others down. `is_connected()` is only
//! true when every enabled channel is live; [`Connectivity`] reports partial
//! states.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;

use super::auth::Credentials;
use super::connection::{
    COMMAND_TIMEOUT, ChannelConnection, ChannelObserver, ConnectionConfig, ConnectionSnapshot,
};
use super::heartbeat::HeartbeatConfig;
use super::messages::{
    AggregateMessage, FairValueMessage, PolygonMessage, QuoteMessage, TradeMessage,
};
use super::reconnect::ReconnectConfig;
use crate::application::ports::FeedSink;
use crate::domain::streaming::{
    AggregateDetail, EventDetail, FeedNotification, FrequencyKind, MarketEvent, QuoteDetail,
    StatusEvent, TradeDetail, millis_to_seconds, nanos_to_seconds, quote_price,
};
use crate::infrastructure::config::{ConfigError, FeedSettings, WebSocketSettings};

// =============================================================================
// Connectivity
// =============================================================================

/// Aggregate connectivity across enabled channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Connectivity {
    /// Every enabled channel is live.
    Full,
    /// Some channels are live.
    Partial {
        /// Live channels.
        live: Vec<FrequencyKind>,
        /// Channels not live.
        down: Vec<FrequencyKind>,
    },
    /// No channel is live.
    Down,
}

impl Connectivity {
    /// Whether at least one channel is live.
    #[must_use]
    pub const fn any_live(&self) -> bool {
        matches!(self, Self::Full | Self::Partial { .. })
    }
}

// =============================================================================
// Normalization
// =============================================================================

/// Normalize a vendor message received on a channel.
///
/// Returns `None` for status and unknown messages, and for aggregates that
/// carry no window timestamp.
#[must_use]
pub fn normalize(message: &PolygonMessage, frequency: FrequencyKind) -> Option<MarketEvent> {
    match message {
        PolygonMessage::SecondAggregate(aggregate) | PolygonMessage::MinuteAggregate(aggregate) => {
            normalize_aggregate(aggregate, frequency)
        }
        PolygonMessage::Trade(trade) => Some(normalize_trade(trade, frequency)),
        PolygonMessage::Quote(quote) => Some(normalize_quote(quote, frequency)),
        PolygonMessage::FairValue(fair_value) => Some(normalize_fair_value(fair_value, frequency)),
        PolygonMessage::Status(_) | PolygonMessage::Unknown => None,
    }
}

fn normalize_aggregate(message: &AggregateMessage, frequency: FrequencyKind) -> Option<MarketEvent> {
    let end = message.end_ms.or(message.start_ms).map(millis_to_seconds)?;
    let start = message.start_ms.map_or(end, millis_to_seconds);
    Some(MarketEvent {
        symbol: message.symbol.clone(),
        price: message.close,
        volume: to_volume(message.volume),
        timestamp: end,
        frequency,
        detail: EventDetail::Aggregate(AggregateDetail {
            open: message.open,
            high: message.high,
            low: message.low,
            close: message.close,
            vwap: message.vwap,
            accumulated_volume: message.accumulated_volume.map(to_volume),
            window_start: start,
            window_end: end,
        }),
    })
}

fn normalize_trade(message: &TradeMessage, frequency: FrequencyKind) -> MarketEvent {
    let size = to_volume(message.size);
    MarketEvent {
        symbol: message.symbol.clone(),
        price: message.price,
        volume: size,
        timestamp: millis_to_seconds(message.timestamp_ms),
        frequency,
        detail: EventDetail::Trade(TradeDetail {
            size,
            exchange: message.exchange,
        }),
    }
}

fn normalize_quote(message: &QuoteMessage, frequency: FrequencyKind) -> MarketEvent {
    MarketEvent {
        symbol: message.symbol.clone(),
        price: quote_price(message.bid_price, message.ask_price),
        volume: 0,
        timestamp: millis_to_seconds(message.timestamp_ms),
        frequency,
        detail: EventDetail::Quote(QuoteDetail {
            bid: message.bid_price,
            ask: message.ask_price,
            bid_size: to_volume(message.bid_size),
            ask_size: to_volume(message.ask_size),
        }),
    }
}

fn normalize_fair_value(message: &FairValueMessage, frequency: FrequencyKind) -> MarketEvent {
    MarketEvent {
        symbol: message.symbol.clone(),
        price: message.fmv,
        volume: 0,
        timestamp: nanos_to_seconds(message.timestamp_ns),
        frequency,
        detail: EventDetail::FairValue {
            fair_value: message.fmv,
        },
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_volume(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value as u64
    } else {
        0
    }
}

/// Channel observer that normalizes messages and forwards everything to a
/// [`FeedSink`].
pub struct Normalizer {
    sink: Arc<dyn FeedSink>,
}

impl Normalizer {
    /// Forward to `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn FeedSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl ChannelObserver for Normalizer {
    async fn on_message(&self, frequency: FrequencyKind, message: PolygonMessage) {
        match normalize(&message, frequency) {
            Some(event) => self.sink.deliver(FeedNotification::Event(event)).await,
            None => tracing::trace!(
                frequency = %frequency,
                event = message.event_code(),
                "Message not normalized"
            ),
        }
    }

    async fn on_status(&self, status: StatusEvent) {
        self.sink.deliver(FeedNotification::Status(status)).await;
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Multi-channel feed.
pub struct FeedOrchestrator {
    configs: BTreeMap<FrequencyKind, ConnectionConfig>,
    observer: Arc<Normalizer>,
    connections: RwLock<BTreeMap<FrequencyKind, Arc<ChannelConnection>>>,
}

impl FeedOrchestrator {
    /// Build channel configurations for every enabled frequency.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no frequency is enabled, or an
    /// enabled frequency has no usable credential. Fair value requires its
    /// own key.
    pub fn configure(
        feeds: &FeedSettings,
        websocket: &WebSocketSettings,
        sink: Arc<dyn FeedSink>,
    ) -> Result<Self, ConfigError> {
        feeds.validate()?;

        let mut configs = BTreeMap::new();
        for frequency in feeds.enabled_frequencies() {
            let key = feeds.credential_for(frequency)?;
            let credentials =
                Credentials::new(key).map_err(|e| ConfigError::InvalidCredential {
                    frequency,
                    reason: e.to_string(),
                })?;
            configs.insert(
                frequency,
                ConnectionConfig {
                    frequency,
                    url: feeds.url_for(frequency).to_string(),
                    credentials,
                    reconnect: ReconnectConfig::from_websocket_settings(websocket),
                    heartbeat: HeartbeatConfig::from_websocket_settings(websocket),
                    auth_timeout: websocket.auth_timeout,
                    connect_timeout: websocket.connect_timeout,
                    command_timeout: COMMAND_TIMEOUT,
                    symbols: feeds.symbols.clone(),
                },
            );
        }

        let orchestrator = Self {
            configs,
            observer: Arc::new(Normalizer::new(sink)),
            connections: RwLock::new(BTreeMap::new()),
        };
        orchestrator.build_connections();
        tracing::info!(
            frequencies = ?orchestrator.enabled_frequencies(),
            "Feed orchestrator configured"
        );
        Ok(orchestrator)
    }

    /// Enabled frequencies in stable order.
    #[must_use]
    pub fn enabled_frequencies(&self) -> Vec<FrequencyKind> {
        self.configs.keys().copied().collect()
    }

    /// Connection for a frequency, if enabled and not torn down.
    #[must_use]
    pub fn connection(&self, frequency: FrequencyKind) -> Option<Arc<ChannelConnection>> {
        self.connections.read().get(&frequency).cloned()
    }

    /// Connect every enabled channel concurrently.
    ///
    /// Returns `true` if at least one channel went live. Channels that did
    /// not keep retrying in the background.
    pub async fn connect(&self) -> bool {
        if self.connections.read().is_empty() {
            self.build_connections();
        }

        let connections = self.all_connections();
        let results = join_all(connections.iter().map(|connection| async move {
            (connection.frequency(), connection.connect().await)
        }))
        .await;

        let mut any = false;
        for (frequency, connected) in results {
            if connected {
                any = true;
            } else {
                tracing::warn!(frequency = %frequency, "Channel did not go live");
            }
        }
        tracing::info!(connectivity = ?self.connectivity(), "Feed connect finished");
        any
    }

    /// Disconnect every channel and clear the registry.
    pub async fn disconnect(&self) {
        let connections: Vec<_> = std::mem::take(&mut *self.connections.write())
            .into_values()
            .collect();
        join_all(connections.iter().map(|connection| connection.disconnect())).await;
        tracing::info!(channels = connections.len(), "Feed disconnected");
    }

    /// Subscribe symbols on the given frequencies, or every enabled one.
    ///
    /// Returns `true` if at least one channel accepted the request.
    pub async fn subscribe<S: AsRef<str> + Sync>(
        &self,
        symbols: &[S],
        frequencies: Option<&[FrequencyKind]>,
    ) -> bool {
        let targets = self.targets(frequencies);
        let results = join_all(targets.iter().map(|c| c.subscribe(symbols))).await;
        results.into_iter().any(|ok| ok)
    }

    /// Unsubscribe symbols on the given frequencies, or every enabled one.
    ///
    /// Returns `true` if at least one channel accepted the request.
    pub async fn unsubscribe<S: AsRef<str> + Sync>(
        &self,
        symbols: &[S],
        frequencies: Option<&[FrequencyKind]>,
    ) -> bool {
        let targets = self.targets(frequencies);
        let results = join_all(targets.iter().map(|c| c.unsubscribe(symbols))).await;
        results.into_iter().any(|ok| ok)
    }

    /// Whether every enabled channel is live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self.connectivity(), Connectivity::Full)
    }

    /// Connectivity across enabled channels.
    #[must_use]
    pub fn connectivity(&self) -> Connectivity {
        let registry = self.connections.read();
        let (live, down): (Vec<_>, Vec<_>) = self
            .configs
            .keys()
            .copied()
            .partition(|f| registry.get(f).is_some_and(|c| c.is_connected()));
        drop(registry);

        match (live.is_empty(), down.is_empty()) {
            (true, _) => Connectivity::Down,
            (false, true) => Connectivity::Full,
            (false, false) => Connectivity::Partial { live, down },
        }
    }

    /// Point-in-time view of every registered channel.
    #[must_use]
    pub fn snapshots(&self) -> Vec<ConnectionSnapshot> {
        self.all_connections()
            .iter()
            .map(|connection| connection.snapshot())
            .collect()
    }

    fn build_connections(&self) {
        let mut registry = self.connections.write();
        for (frequency, config) in &self.configs {
            registry.entry(*frequency).or_insert_with(|| {
                Arc::new(ChannelConnection::new(
                    config.clone(),
                    Arc::clone(&self.observer) as Arc<dyn ChannelObserver>,
                ))
            });
        }
    }

    fn all_connections(&self) -> Vec<Arc<ChannelConnection>> {
        self.connections.read().values().cloned().collect()
    }

    fn targets(&self, frequencies: Option<&[FrequencyKind]>) -> Vec<Arc<ChannelConnection>> {
        let registry = self.connections.read();
        match frequencies {
            None => registry.values().cloned().collect(),
            Some(wanted) => wanted
                .iter()
                .filter_map(|f| registry.get(f).cloned())
                .collect(),
        }
    }
}

impl std::fmt::Debug for FeedOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedOrchestrator")
            .field("enabled", &self.enabled_frequencies())
            .field("connectivity", &self.connectivity())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::application::ports::MockFeedSink;
    use crate::domain::streaming::EventKind;

    fn parse(json: &str) -> PolygonMessage {
        serde_json::from_str(json).unwrap()
    }

    fn null_sink() -> Arc<dyn FeedSink> {
        let mut sink = MockFeedSink::new();
        sink.expect_deliver().returning(|_| ());
        Arc::new(sink)
    }

    fn feeds(second: bool, minute: bool, fair_value: bool) -> FeedSettings {
        FeedSettings {
            enable_second_aggregates: second,
            enable_minute_aggregates: minute,
            enable_fair_value: fair_value,
            api_key: Some("stocks-key".to_string()),
            fair_value_api_key: Some("fmv-key".to_string()),
            ..FeedSettings::default()
        }
    }

    #[test_case(
        r#"{"ev":"A","sym":"AAPL","v":10,"o":1,"c":2.5,"h":3,"l":0.5,"s":1699999999000,"e":1700000000000}"#,
        FrequencyKind::PerSecond, EventKind::Aggregate, 2.5, 10, 1_700_000_000.0
        ; "second aggregate uses close and window end"
    )]
    #[test_case(
        r#"{"ev":"AM","sym":"AAPL","v":4110,"o":1,"c":1.5,"h":2,"l":1,"s":1699999940000}"#,
        FrequencyKind::PerMinute, EventKind::Aggregate, 1.5, 4110, 1_699_999_940.0
        ; "minute aggregate without end falls back to start"
    )]
    #[test_case(
        r#"{"ev":"T","sym":"MSFT","p":114.125,"s":100,"t":1700000000500}"#,
        FrequencyKind::PerSecond, EventKind::Trade, 114.125, 100, 1_700_000_000.5
        ; "trade"
    )]
    #[test_case(
        r#"{"ev":"Q","sym":"MSFT","bp":100,"ap":0,"bs":5,"as":0,"t":1700000000000}"#,
        FrequencyKind::PerSecond, EventKind::Quote, 100.0, 0, 1_700_000_000.0
        ; "one sided quote uses bid"
    )]
    #[test_case(
        r#"{"ev":"Q","sym":"MSFT","bp":100,"ap":102,"bs":5,"as":7,"t":1700000000000}"#,
        FrequencyKind::PerSecond, EventKind::Quote, 101.0, 0, 1_700_000_000.0
        ; "two sided quote uses midpoint"
    )]
    #[test_case(
        r#"{"ev":"FMV","fmv":189.22,"sym":"AAPL","t":1700000000000000000}"#,
        FrequencyKind::FairValue, EventKind::FairValue, 189.22, 0, 1_700_000_000.0
        ; "fair value in nanoseconds"
    )]
    fn normalizes(
        json: &str,
        frequency: FrequencyKind,
        kind: EventKind,
        price: f64,
        volume: u64,
        timestamp: f64,
    ) {
        let event = normalize(&parse(json), frequency).unwrap();
        assert_eq!(event.kind(), kind);
        assert_eq!(event.frequency, frequency);
        assert_eq!(event.price, price);
        assert_eq!(event.volume, volume);
        assert_eq!(event.timestamp, timestamp);
    }

    #[test]
    fn status_unknown_and_untimed_messages_are_dropped() {
        let status = parse(r#"{"ev":"status","status":"success","message":"subscribed to: A.AAPL"}"#);
        assert!(normalize(&status, FrequencyKind::PerSecond).is_none());
        assert!(normalize(&PolygonMessage::Unknown, FrequencyKind::PerSecond).is_none());
        let untimed = parse(r#"{"ev":"A","sym":"AAPL","o":1,"c":2,"h":3,"l":0.5}"#);
        assert!(normalize(&untimed, FrequencyKind::PerSecond).is_none());
    }

    #[test]
    fn configure_requires_an_enabled_frequency() {
        let err = FeedOrchestrator::configure(
            &feeds(false, false, false),
            &WebSocketSettings::default(),
            null_sink(),
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::NoFrequencyEnabled);
    }

    #[test]
    fn fair_value_needs_its_own_key() {
        let mut settings = feeds(false, false, true);
        settings.fair_value_api_key = None;
        let err =
            FeedOrchestrator::configure(&settings, &WebSocketSettings::default(), null_sink())
                .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingCredential {
                frequency: FrequencyKind::FairValue,
                ..
            }
        ));
    }

    #[test]
    fn only_enabled_frequencies_get_connections() {
        let orchestrator = FeedOrchestrator::configure(
            &feeds(true, false, false),
            &WebSocketSettings::default(),
            null_sink(),
        )
        .unwrap();

        assert_eq!(orchestrator.enabled_frequencies(), vec![FrequencyKind::PerSecond]);
        assert!(orchestrator.connection(FrequencyKind::PerSecond).is_some());
        assert!(orchestrator.connection(FrequencyKind::PerMinute).is_none());
        assert!(orchestrator.connection(FrequencyKind::FairValue).is_none());
        assert!(!orchestrator.is_connected());
        assert_eq!(orchestrator.connectivity(), Connectivity::Down);
        assert_eq!(orchestrator.snapshots().len(), 1);
    }

    #[tokio::test]
    async fn subscribe_before_connect_fails_everywhere() {
        let orchestrator = FeedOrchestrator::configure(
            &feeds(true, true, false),
            &WebSocketSettings::default(),
            null_sink(),
        )
        .unwrap();
        assert!(!orchestrator.subscribe(&["AAPL"], None).await);
        assert!(
            !orchestrator
                .unsubscribe(&["AAPL"], Some(&[FrequencyKind::PerMinute]))
                .await
        );
    }

    #[tokio::test]
    async fn disconnect_clears_registry() {
        let orchestrator = FeedOrchestrator::configure(
            &feeds(true, true, true),
            &WebSocketSettings::default(),
            null_sink(),
        )
        .unwrap();
        orchestrator.disconnect().await;
        assert!(orchestrator.snapshots().is_empty());
        assert!(orchestrator.connection(FrequencyKind::PerSecond).is_none());
        assert_eq!(orchestrator.enabled_frequencies().len(), 3);
    }

    #[tokio::test]
    async fn normalizer_forwards_events_and_status() {
        let mut sink = MockFeedSink::new();
        sink.expect_deliver()
            .withf(|n| matches!(n, FeedNotification::Event(e) if e.symbol == "AAPL"))
            .times(1)
            .returning(|_| ());
        sink.expect_deliver()
            .withf(|n| matches!(n, FeedNotification::Status(_)))
            .times(1)
            .returning(|_| ());
        let normalizer = Normalizer::new(Arc::new(sink));

        normalizer
            .on_message(
                FrequencyKind::FairValue,
                parse(r#"{"ev":"FMV","fmv":1.0,"sym":"AAPL","t":1700000000000000000}"#),
            )
            .await;
        normalizer
            .on_message(FrequencyKind::FairValue, PolygonMessage::Unknown)
            .await;
        normalizer
            .on_status(StatusEvent {
                frequency: FrequencyKind::FairValue,
                state: crate::domain::streaming::ConnectionState::Connecting,
                detail: None,
            })
            .await;
    }
}
