//! Polygon WebSocket Message Types
//!
//! Wire format types for the vendor's streaming cluster. Every inbound
//! element carries an `ev` discriminator; frames are a single object or an
//! array of objects.
//!
//! # Inbound
//!
//! - `status`: connection/auth/subscription status
//! - `A` / `AM`: per-second / per-minute aggregates
//! - `T`: trades
//! - `Q`: quotes
//! - `FMV`: fair market value (nanosecond timestamps)
//!
//! # Outbound
//!
//! ```json
//! {"action":"auth","params":"<key>"}
//! {"action":"subscribe","params":"A.AAPL,A.MSFT"}
//! ```

use serde::{Deserialize, Serialize};

use crate::domain::streaming::FrequencyKind;

// =============================================================================
// Inbound Messages
// =============================================================================

/// Any inbound element, discriminated on `ev`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "ev")]
pub enum PolygonMessage {
    /// Connection/auth/subscription status.
    #[serde(rename = "status")]
    Status(StatusMessage),
    /// Per-second aggregate.
    #[serde(rename = "A")]
    SecondAggregate(AggregateMessage),
    /// Per-minute aggregate.
    #[serde(rename = "AM")]
    MinuteAggregate(AggregateMessage),
    /// Trade.
    #[serde(rename = "T")]
    Trade(TradeMessage),
    /// Quote.
    #[serde(rename = "Q")]
    Quote(QuoteMessage),
    /// Fair market value.
    #[serde(rename = "FMV")]
    FairValue(FairValueMessage),
    /// Any other event type; ignored.
    #[serde(other)]
    Unknown,
}

impl PolygonMessage {
    /// Wire discriminator, for logging.
    #[must_use]
    pub const fn event_code(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::SecondAggregate(_) => "A",
            Self::MinuteAggregate(_) => "AM",
            Self::Trade(_) => "T",
            Self::Quote(_) => "Q",
            Self::FairValue(_) => "FMV",
            Self::Unknown => "unknown",
        }
    }
}

/// Status message.
///
/// # Wire Format (JSON)
/// ```json
/// {"ev":"status","status":"auth_success","message":"authenticated"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusMessage {
    /// Status code string.
    pub status: String,
    /// Free-form description.
    #[serde(default)]
    pub message: String,
}

/// Classified status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    /// Socket accepted.
    Connected,
    /// Credentials accepted.
    AuthSuccess,
    /// Credentials rejected.
    AuthFailed,
    /// Subscription change acknowledged.
    Success,
    /// Anything else (`error`, `max_connections`, ...).
    Other,
}

impl StatusMessage {
    /// Classify the status code.
    #[must_use]
    pub fn kind(&self) -> StatusKind {
        match self.status.as_str() {
            "connected" => StatusKind::Connected,
            "auth_success" => StatusKind::AuthSuccess,
            "auth_failed" => StatusKind::AuthFailed,
            "success" => StatusKind::Success,
            _ => StatusKind::Other,
        }
    }
}

/// Aggregate bar (`A` and `AM`).
///
/// # Wire Format (JSON)
/// ```json
/// {"ev":"AM","sym":"AAPL","v":4110,"av":9470157,"op":0.4372,"vw":0.4488,
///  "o":0.4488,"c":0.4486,"h":0.4489,"l":0.4486,"a":0.4352,"z":685,
///  "s":1610144640000,"e":1610144700000}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMessage {
    /// Ticker symbol.
    #[serde(rename = "sym")]
    pub symbol: String,
    /// Tick volume.
    #[serde(rename = "v", default)]
    pub volume: f64,
    /// Accumulated volume for the day.
    #[serde(rename = "av", default)]
    pub accumulated_volume: Option<f64>,
    /// Official opening price of the day.
    #[serde(rename = "op", default)]
    pub official_open: Option<f64>,
    /// Tick VWAP.
    #[serde(rename = "vw", default)]
    pub vwap: Option<f64>,
    /// Window open.
    #[serde(rename = "o")]
    pub open: f64,
    /// Window close.
    #[serde(rename = "c")]
    pub close: f64,
    /// Window high.
    #[serde(rename = "h")]
    pub high: f64,
    /// Window low.
    #[serde(rename = "l")]
    pub low: f64,
    /// Day VWAP.
    #[serde(rename = "a", default)]
    pub day_vwap: Option<f64>,
    /// Average trade size.
    #[serde(rename = "z", default)]
    pub average_size: Option<f64>,
    /// Window start, epoch milliseconds.
    #[serde(rename = "s", default)]
    pub start_ms: Option<i64>,
    /// Window end, epoch milliseconds.
    #[serde(rename = "e", default)]
    pub end_ms: Option<i64>,
}

/// Trade.
///
/// # Wire Format (JSON)
/// ```json
/// {"ev":"T","sym":"MSFT","x":4,"i":"12345","z":3,"p":114.125,"s":100,
///  "c":[0,12],"t":1536036818784,"q":3681328}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeMessage {
    /// Ticker symbol.
    #[serde(rename = "sym")]
    pub symbol: String,
    /// Exchange ID.
    #[serde(rename = "x", default)]
    pub exchange: Option<i64>,
    /// Trade ID.
    #[serde(rename = "i", default)]
    pub trade_id: Option<String>,
    /// Tape.
    #[serde(rename = "z", default)]
    pub tape: Option<i64>,
    /// Price.
    #[serde(rename = "p")]
    pub price: f64,
    /// Size.
    #[serde(rename = "s", default)]
    pub size: f64,
    /// Condition codes.
    #[serde(rename = "c", default)]
    pub conditions: Vec<i64>,
    /// Epoch milliseconds.
    #[serde(rename = "t")]
    pub timestamp_ms: i64,
    /// Sequence number.
    #[serde(rename = "q", default)]
    pub sequence: Option<i64>,
}

/// Quote.
///
/// # Wire Format (JSON)
/// ```json
/// {"ev":"Q","sym":"MSFT","bx":4,"bp":114.125,"bs":100,"ax":7,"ap":114.128,
///  "as":160,"c":0,"t":1536036818784,"z":3}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteMessage {
    /// Ticker symbol.
    #[serde(rename = "sym")]
    pub symbol: String,
    /// Bid exchange ID.
    #[serde(rename = "bx", default)]
    pub bid_exchange: Option<i64>,
    /// Bid price.
    #[serde(rename = "bp", default)]
    pub bid_price: f64,
    /// Bid size.
    #[serde(rename = "bs", default)]
    pub bid_size: f64,
    /// Ask exchange ID.
    #[serde(rename = "ax", default)]
    pub ask_exchange: Option<i64>,
    /// Ask price.
    #[serde(rename = "ap", default)]
    pub ask_price: f64,
    /// Ask size.
    #[serde(rename = "as", default)]
    pub ask_size: f64,
    /// Condition code.
    #[serde(rename = "c", default)]
    pub condition: Option<i64>,
    /// Epoch milliseconds.
    #[serde(rename = "t")]
    pub timestamp_ms: i64,
    /// Tape.
    #[serde(rename = "z", default)]
    pub tape: Option<i64>,
}

/// Fair market value.
///
/// # Wire Format (JSON)
/// ```json
/// {"ev":"FMV","fmv":189.22,"sym":"AAPL","t":1678220098130000000}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairValueMessage {
    /// Ticker symbol.
    #[serde(rename = "sym")]
    pub symbol: String,
    /// Fair market value.
    pub fmv: f64,
    /// Epoch nanoseconds.
    #[serde(rename = "t")]
    pub timestamp_ns: i64,
}

// =============================================================================
// Outbound Requests
// =============================================================================

/// Outbound control action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    /// Authenticate with an API key.
    Auth,
    /// Add subscriptions.
    Subscribe,
    /// Remove subscriptions.
    Unsubscribe,
}

/// Outbound control request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    /// Requested action.
    pub action: ControlAction,
    /// Action parameters (key or comma-separated channel tokens).
    pub params: String,
}

impl ControlRequest {
    /// Authentication request.
    #[must_use]
    pub fn auth(api_key: &str) -> Self {
        Self {
            action: ControlAction::Auth,
            params: api_key.to_string(),
        }
    }

    /// Subscribe request for symbols on one frequency.
    #[must_use]
    pub fn subscribe<S: AsRef<str>>(frequency: FrequencyKind, symbols: &[S]) -> Self {
        Self {
            action: ControlAction::Subscribe,
            params: Self::channel_params(frequency, symbols),
        }
    }

    /// Unsubscribe request for symbols on one frequency.
    #[must_use]
    pub fn unsubscribe<S: AsRef<str>>(frequency: FrequencyKind, symbols: &[S]) -> Self {
        Self {
            action: ControlAction::Unsubscribe,
            params: Self::channel_params(frequency, symbols),
        }
    }

    fn channel_params<S: AsRef<str>>(frequency: FrequencyKind, symbols: &[S]) -> String {
        symbols
            .iter()
            .map(|s| frequency.channel_token(s.as_ref()))
            .collect::<Vec<_>>()
            .join(",")
    }
}
