//! Streaming Domain Types
//!
//! Normalized market events, the frequency channels they arrive on, and the
//! connection lifecycle states reported for each channel.
//!
//! Everything past the protocol boundary speaks in these types: vendor wire
//! messages are converted into [`MarketEvent`] once and never leak further.

use std::fmt;

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::America::New_York;
use serde::{Deserialize, Serialize};

// =============================================================================
// Frequency
// =============================================================================

/// One of the independent upstream channels.
///
/// Each frequency has its own connection, credential, subscription set and
/// processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyKind {
    /// Per-second aggregates (`A.*`).
    PerSecond,
    /// Per-minute aggregates (`AM.*`).
    PerMinute,
    /// Fair market value updates (`FMV.*`).
    FairValue,
}

impl FrequencyKind {
    /// Every frequency, in a stable order.
    pub const ALL: [Self; 3] = [Self::PerSecond, Self::PerMinute, Self::FairValue];

    /// Wire subscription prefix for this frequency.
    #[must_use]
    pub const fn wire_prefix(self) -> &'static str {
        match self {
            Self::PerSecond => "A",
            Self::PerMinute => "AM",
            Self::FairValue => "FMV",
        }
    }

    /// Stable lowercase name, used for labels and log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PerSecond => "per_second",
            Self::PerMinute => "per_minute",
            Self::FairValue => "fair_value",
        }
    }

    /// Dense index for per-frequency arrays.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::PerSecond => 0,
            Self::PerMinute => 1,
            Self::FairValue => 2,
        }
    }

    /// Subscription token for a symbol, e.g. `AM.AAPL`.
    #[must_use]
    pub fn channel_token(self, symbol: &str) -> String {
        format!("{}.{symbol}", self.wire_prefix())
    }
}

impl fmt::Display for FrequencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Market Events
// =============================================================================

/// Kind of upstream update a [`MarketEvent`] was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// OHLCV aggregate bar.
    Aggregate,
    /// Individual trade print.
    Trade,
    /// Top-of-book quote.
    Quote,
    /// Fair market value estimate.
    FairValue,
}

impl EventKind {
    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aggregate => "aggregate",
            Self::Trade => "trade",
            Self::Quote => "quote",
            Self::FairValue => "fair_value",
        }
    }
}

/// Aggregate bar fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateDetail {
    /// Opening price of the window.
    pub open: f64,
    /// Highest price in the window.
    pub high: f64,
    /// Lowest price in the window.
    pub low: f64,
    /// Closing price of the window.
    pub close: f64,
    /// Volume weighted average price, if reported.
    pub vwap: Option<f64>,
    /// Volume accumulated over the trading day, if reported.
    pub accumulated_volume: Option<u64>,
    /// Window start, seconds since epoch.
    pub window_start: f64,
    /// Window end, seconds since epoch.
    pub window_end: f64,
}

/// Trade print fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeDetail {
    /// Shares traded.
    pub size: u64,
    /// Exchange identifier, if reported.
    pub exchange: Option<i64>,
}

/// Quote fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteDetail {
    /// Best bid price.
    pub bid: f64,
    /// Best ask price.
    pub ask: f64,
    /// Bid size.
    pub bid_size: u64,
    /// Ask size.
    pub ask_size: u64,
}

/// Type-specific payload of a [`MarketEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDetail {
    /// Aggregate bar.
    Aggregate(AggregateDetail),
    /// Trade print.
    Trade(TradeDetail),
    /// Quote.
    Quote(QuoteDetail),
    /// Fair value.
    FairValue {
        /// Vendor-computed fair market value.
        fair_value: f64,
    },
}

impl EventDetail {
    /// Kind of update this detail belongs to.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Aggregate(_) => EventKind::Aggregate,
            Self::Trade(_) => EventKind::Trade,
            Self::Quote(_) => EventKind::Quote,
            Self::FairValue { .. } => EventKind::FairValue,
        }
    }
}

/// A normalized market update.
///
/// `timestamp` is always seconds since the Unix epoch regardless of the wire
/// unit the vendor used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEvent {
    /// Ticker symbol.
    pub symbol: String,
    /// Representative price (close, trade price, quote mid or fair value).
    pub price: f64,
    /// Volume, zero when the update carries none.
    pub volume: u64,
    /// Seconds since epoch.
    pub timestamp: f64,
    /// Channel the update arrived on.
    pub frequency: FrequencyKind,
    /// Type-specific fields.
    pub detail: EventDetail,
}

impl MarketEvent {
    /// Kind of update.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.detail.kind()
    }

    /// Whether the event can be routed: non-empty symbol and finite
    /// price and timestamp.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.symbol.trim().is_empty() && self.price.is_finite() && self.timestamp.is_finite()
    }

    /// US equity session the event timestamp falls in.
    #[must_use]
    pub fn market_session(&self) -> MarketSession {
        MarketSession::at(self.timestamp)
    }
}

// =============================================================================
// Normalization Helpers
// =============================================================================

/// Convert epoch milliseconds to epoch seconds.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn millis_to_seconds(millis: i64) -> f64 {
    let whole = millis.div_euclid(1_000);
    let frac = millis.rem_euclid(1_000);
    whole as f64 + frac as f64 / 1_000.0
}

/// Convert epoch nanoseconds to epoch seconds.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn nanos_to_seconds(nanos: i64) -> f64 {
    let whole = nanos.div_euclid(1_000_000_000);
    let frac = nanos.rem_euclid(1_000_000_000);
    whole as f64 + frac as f64 / 1_000_000_000.0
}

/// Representative price of a quote.
///
/// The midpoint when both sides are quoted, otherwise whichever side is
/// non-zero.
#[must_use]
pub fn quote_price(bid: f64, ask: f64) -> f64 {
    match (bid > 0.0, ask > 0.0) {
        (true, true) => (bid + ask) / 2.0,
        (true, false) => bid,
        (false, true) => ask,
        (false, false) => 0.0,
    }
}

// =============================================================================
// Market Session
// =============================================================================

/// US equity trading session, evaluated in New York local time.
///
/// Exchange holidays are not modelled; a holiday weekday classifies the same
/// as any other weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketSession {
    /// 04:00 to 09:30.
    PreMarket,
    /// 09:30 to 16:00.
    Open,
    /// 16:00 to 20:00.
    AfterHours,
    /// Overnight and weekends.
    Closed,
}

impl MarketSession {
    /// Session at the given epoch-seconds timestamp.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn at(timestamp: f64) -> Self {
        if !timestamp.is_finite() {
            return Self::Closed;
        }
        let Some(utc) = DateTime::<Utc>::from_timestamp(timestamp.floor() as i64, 0) else {
            return Self::Closed;
        };
        let local = utc.with_timezone(&New_York);
        if matches!(local.weekday(), Weekday::Sat | Weekday::Sun) {
            return Self::Closed;
        }
        match local.hour() * 60 + local.minute() {
            240..570 => Self::PreMarket,
            570..960 => Self::Open,
            960..1200 => Self::AfterHours,
            _ => Self::Closed,
        }
    }

    /// Stable lowercase name, as published on the bus.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreMarket => "pre_market",
            Self::Open => "open",
            Self::AfterHours => "after_hours",
            Self::Closed => "closed",
        }
    }
}

// =============================================================================
// Connection Lifecycle
// =============================================================================

/// Lifecycle state of one channel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket and no session task.
    #[default]
    Disconnected,
    /// Opening the socket.
    Connecting,
    /// Socket open, auth request sent, waiting for acknowledgement.
    AuthPending,
    /// Authenticated and streaming.
    Connected,
    /// Streaming, but the vendor never acknowledged the auth request.
    ConnectedUnconfirmed,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
}

impl ConnectionState {
    /// Whether the connection is streaming data.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Connected | Self::ConnectedUnconfirmed)
    }

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::AuthPending => "auth_pending",
            Self::Connected => "connected",
            Self::ConnectedUnconfirmed => "connected_unconfirmed",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A connection state change, reported alongside data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Channel that changed state.
    pub frequency: FrequencyKind,
    /// New state.
    pub state: ConnectionState,
    /// Human-readable context (error, attempt number, close reason).
    pub detail: Option<String>,
}

/// Everything a channel hands to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedNotification {
    /// A normalized market event.
    Event(MarketEvent),
    /// A connection state change.
    Status(StatusEvent),
}
