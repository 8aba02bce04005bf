//! Ingest Configuration Settings
//!
//! Configuration types for the ingest service, loaded from environment
//! variables. Parsing goes through a lookup function so tests can inject a
//! map instead of mutating the process environment.

use std::time::Duration;

use crate::domain::streaming::FrequencyKind;

/// Default endpoint for aggregate channels.
pub const DEFAULT_STOCKS_URL: &str = "wss://socket.polygon.io/stocks";

/// Default endpoint for the fair value channel.
pub const DEFAULT_FAIR_VALUE_URL: &str = "wss://business.polygon.io/stocks";

const API_KEY_VAR: &str = "POLYGON_API_KEY";
const FAIR_VALUE_API_KEY_VAR: &str = "POLYGON_FMV_API_KEY";

// =============================================================================
// Feed Settings
// =============================================================================

/// Which frequencies to stream and how to reach them.
#[derive(Clone, PartialEq, Eq)]
pub struct FeedSettings {
    /// Stream per-second aggregates.
    pub enable_second_aggregates: bool,
    /// Stream per-minute aggregates.
    pub enable_minute_aggregates: bool,
    /// Stream fair value updates.
    pub enable_fair_value: bool,
    /// Key for the aggregate channels.
    pub api_key: Option<String>,
    /// Distinct key for the fair value channel.
    pub fair_value_api_key: Option<String>,
    /// Endpoint for the aggregate channels.
    pub stocks_url: String,
    /// Endpoint for the fair value channel.
    pub fair_value_url: String,
    /// Symbols subscribed on every enabled channel whenever it goes live.
    pub symbols: Vec<String>,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            enable_second_aggregates: true,
            enable_minute_aggregates: false,
            enable_fair_value: false,
            api_key: None,
            fair_value_api_key: None,
            stocks_url: DEFAULT_STOCKS_URL.to_string(),
            fair_value_url: DEFAULT_FAIR_VALUE_URL.to_string(),
            symbols: Vec::new(),
        }
    }
}

impl FeedSettings {
    /// Whether a frequency is enabled.
    #[must_use]
    pub const fn is_enabled(&self, frequency: FrequencyKind) -> bool {
        match frequency {
            FrequencyKind::PerSecond => self.enable_second_aggregates,
            FrequencyKind::PerMinute => self.enable_minute_aggregates,
            FrequencyKind::FairValue => self.enable_fair_value,
        }
    }

    /// Enabled frequencies in stable order.
    #[must_use]
    pub fn enabled_frequencies(&self) -> Vec<FrequencyKind> {
        FrequencyKind::ALL
            .into_iter()
            .filter(|f| self.is_enabled(*f))
            .collect()
    }

    /// Endpoint for a frequency.
    #[must_use]
    pub fn url_for(&self, frequency: FrequencyKind) -> &str {
        match frequency {
            FrequencyKind::FairValue => &self.fair_value_url,
            FrequencyKind::PerSecond | FrequencyKind::PerMinute => &self.stocks_url,
        }
    }

    /// Credential for a frequency.
    ///
    /// # Errors
    ///
    /// Returns `MissingCredential` if the frequency's key is absent or blank.
    /// Fair value never falls back to the aggregate key.
    pub fn credential_for(&self, frequency: FrequencyKind) -> Result<&str, ConfigError> {
        let (key, variable) = match frequency {
            FrequencyKind::FairValue => (&self.fair_value_api_key, FAIR_VALUE_API_KEY_VAR),
            FrequencyKind::PerSecond | FrequencyKind::PerMinute => (&self.api_key, API_KEY_VAR),
        };
        key.as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingCredential {
                frequency,
                variable,
            })
    }

    /// Check that at least one frequency is enabled and each has a key.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let enabled = self.enabled_frequencies();
        if enabled.is_empty() {
            return Err(ConfigError::NoFrequencyEnabled);
        }
        for frequency in enabled {
            self.credential_for(frequency)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for FeedSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("FeedSettings")
            .field("enable_second_aggregates", &self.enable_second_aggregates)
            .field("enable_minute_aggregates", &self.enable_minute_aggregates)
            .field("enable_fair_value", &self.enable_fair_value)
            .field("api_key", &redact(&self.api_key))
            .field("fair_value_api_key", &redact(&self.fair_value_api_key))
            .field("stocks_url", &self.stocks_url)
            .field("fair_value_url", &self.fair_value_url)
            .field("symbols", &self.symbols)
            .finish()
    }
}

// =============================================================================
// WebSocket Settings
// =============================================================================

/// WebSocket connection settings shared by every channel.
#[derive(Debug, Clone, PartialEq)]
pub struct WebSocketSettings {
    /// How often inbound silence is checked.
    pub heartbeat_interval: Duration,
    /// Inbound silence tolerated before pinging.
    pub heartbeat_timeout: Duration,
    /// Delay before the first reconnection attempt.
    pub reconnect_delay_base: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Jitter fraction applied to reconnection delays.
    pub reconnect_jitter: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Wait for an auth acknowledgement.
    pub auth_timeout: Duration,
    /// Wait for a channel to go live on connect.
    pub connect_timeout: Duration,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(30),
            reconnect_delay_base: Duration::from_secs(5),
            reconnect_delay_max: Duration::from_secs(60),
            reconnect_jitter: 0.0,
            max_reconnect_attempts: 10,
            auth_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(15),
        }
    }
}

// =============================================================================
// Publisher Settings
// =============================================================================

/// Distribution publisher settings.
#[derive(Clone, PartialEq, Eq)]
pub struct PublisherSettings {
    /// Maximum buffered events.
    pub buffer_capacity: usize,
    /// Redis URL; `None` runs buffer-only.
    pub redis_url: Option<String>,
    /// Bus channel prefix.
    pub channel_prefix: String,
    /// Throughput report interval.
    pub stats_interval: Duration,
    /// Wait for the bus to answer at startup.
    pub bus_connect_timeout: Duration,
    /// Value of the `source` payload field.
    pub source: String,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            buffer_capacity: 1_000,
            redis_url: None,
            channel_prefix: "market".to_string(),
            stats_interval: Duration::from_secs(60),
            bus_connect_timeout: Duration::from_secs(5),
            source: "polygon".to_string(),
        }
    }
}

impl std::fmt::Debug for PublisherSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherSettings")
            .field("buffer_capacity", &self.buffer_capacity)
            .field(
                "redis_url",
                &self.redis_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("channel_prefix", &self.channel_prefix)
            .field("stats_interval", &self.stats_interval)
            .field("bus_connect_timeout", &self.bus_connect_timeout)
            .field("source", &self.source)
            .finish()
    }
}

// =============================================================================
// Server Settings
// =============================================================================

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

// =============================================================================
// Complete Configuration
// =============================================================================

/// Complete ingest configuration.
#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    /// Frequencies, endpoints and keys.
    pub feeds: FeedSettings,
    /// Connection timings.
    pub websocket: WebSocketSettings,
    /// Buffering and bus settings.
    pub publisher: PublisherSettings,
    /// Server ports.
    pub server: ServerSettings,
}

impl IngestConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if no frequency is enabled, an enabled frequency
    /// lacks its key, or a timing value is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`Self::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);
        let feed_defaults = FeedSettings::default();
        let ws_defaults = WebSocketSettings::default();
        let pub_defaults = PublisherSettings::default();

        let feeds = FeedSettings {
            enable_second_aggregates: env.bool(
                "INGEST_ENABLE_SECOND_AGGREGATES",
                feed_defaults.enable_second_aggregates,
            ),
            enable_minute_aggregates: env.bool(
                "INGEST_ENABLE_MINUTE_AGGREGATES",
                feed_defaults.enable_minute_aggregates,
            ),
            enable_fair_value: env.bool("INGEST_ENABLE_FAIR_VALUE", feed_defaults.enable_fair_value),
            api_key: env.string(API_KEY_VAR),
            fair_value_api_key: env.string(FAIR_VALUE_API_KEY_VAR),
            stocks_url: env
                .string("INGEST_STOCKS_WS_URL")
                .unwrap_or(feed_defaults.stocks_url),
            fair_value_url: env
                .string("INGEST_FAIR_VALUE_WS_URL")
                .unwrap_or(feed_defaults.fair_value_url),
            symbols: env.list("INGEST_SYMBOLS"),
        };
        feeds.validate()?;

        let websocket = WebSocketSettings {
            heartbeat_interval: env.positive_secs(
                "INGEST_HEARTBEAT_INTERVAL_SECS",
                ws_defaults.heartbeat_interval,
            )?,
            heartbeat_timeout: env.positive_secs(
                "INGEST_HEARTBEAT_TIMEOUT_SECS",
                ws_defaults.heartbeat_timeout,
            )?,
            reconnect_delay_base: env.secs(
                "INGEST_RECONNECT_DELAY_BASE_SECS",
                ws_defaults.reconnect_delay_base,
            ),
            reconnect_delay_max: env.secs(
                "INGEST_RECONNECT_DELAY_MAX_SECS",
                ws_defaults.reconnect_delay_max,
            ),
            reconnect_jitter: env.fraction("INGEST_RECONNECT_JITTER", ws_defaults.reconnect_jitter)?,
            max_reconnect_attempts: env.parse(
                "INGEST_MAX_RECONNECT_ATTEMPTS",
                ws_defaults.max_reconnect_attempts,
            ),
            auth_timeout: env.positive_secs("INGEST_AUTH_TIMEOUT_SECS", ws_defaults.auth_timeout)?,
            connect_timeout: env
                .positive_secs("INGEST_CONNECT_TIMEOUT_SECS", ws_defaults.connect_timeout)?,
        };

        let publisher = PublisherSettings {
            buffer_capacity: env.parse("INGEST_BUFFER_CAPACITY", pub_defaults.buffer_capacity),
            redis_url: env.string("REDIS_URL"),
            channel_prefix: env
                .string("INGEST_CHANNEL_PREFIX")
                .unwrap_or(pub_defaults.channel_prefix),
            stats_interval: env
                .positive_secs("INGEST_STATS_INTERVAL_SECS", pub_defaults.stats_interval)?,
            bus_connect_timeout: pub_defaults.bus_connect_timeout,
            source: pub_defaults.source,
        };

        let server = ServerSettings {
            health_port: env.parse("INGEST_HEALTH_PORT", ServerSettings::default().health_port),
        };

        Ok(Self {
            feeds,
            websocket,
            publisher,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Every frequency is disabled.
    #[error("no data frequency enabled")]
    NoFrequencyEnabled,
    /// An enabled frequency has no key.
    #[error("{frequency} is enabled but {variable} is not set")]
    MissingCredential {
        /// Frequency lacking a key.
        frequency: FrequencyKind,
        /// Variable that should hold it.
        variable: &'static str,
    },
    /// A key was present but unusable.
    #[error("invalid credential for {frequency}: {reason}")]
    InvalidCredential {
        /// Frequency the key belongs to.
        frequency: FrequencyKind,
        /// Why it was rejected.
        reason: String,
    },
    /// A variable parsed but is outside its allowed range.
    #[error("{variable} {reason}")]
    InvalidValue {
        /// Offending variable.
        variable: &'static str,
        /// Allowed range.
        reason: &'static str,
    },
}

// =============================================================================
// Parsing Helpers
// =============================================================================

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.string(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        self.string(key)
            .and_then(|v| v.parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn positive_secs(&self, key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        let value = self.secs(key, default);
        if value.is_zero() {
            return Err(ConfigError::InvalidValue {
                variable: key,
                reason: "must be at least one second",
            });
        }
        Ok(value)
    }

    fn fraction(&self, key: &'static str, default: f64) -> Result<f64, ConfigError> {
        let value = self.parse(key, default);
        if !value.is_finite() || !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::InvalidValue {
                variable: key,
                reason: "must be a number between 0 and 1",
            });
        }
        Ok(value)
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        match self.string(key).map(|v| v.to_ascii_lowercase()).as_deref() {
            Some("1" | "true" | "yes" | "on") => true,
            Some("0" | "false" | "no" | "off") => false,
            _ => default,
        }
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.string(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_ascii_uppercase)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use test_case::test_case;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<IngestConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        IngestConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_with_only_api_key() {
        let config = load(&[("POLYGON_API_KEY", "key")]).unwrap();
        assert_eq!(config.feeds.enabled_frequencies(), vec![FrequencyKind::PerSecond]);
        assert_eq!(config.feeds.stocks_url, DEFAULT_STOCKS_URL);
        assert_eq!(config.websocket, WebSocketSettings::default());
        assert_eq!(config.publisher.buffer_capacity, 1_000);
        assert_eq!(config.publisher.channel_prefix, "market");
        assert!(config.publisher.redis_url.is_none());
        assert_eq!(config.server.health_port, 8083);
    }

    #[test]
    fn missing_key_for_enabled_frequency() {
        let err = load(&[]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingCredential {
                frequency: FrequencyKind::PerSecond,
                variable: "POLYGON_API_KEY",
            }
        );
    }

    #[test]
    fn nothing_enabled_is_error() {
        let err = load(&[
            ("POLYGON_API_KEY", "key"),
            ("INGEST_ENABLE_SECOND_AGGREGATES", "false"),
        ])
        .unwrap_err();
        assert_eq!(err, ConfigError::NoFrequencyEnabled);
    }

    #[test]
    fn fair_value_needs_its_own_key() {
        let err = load(&[
            ("POLYGON_API_KEY", "key"),
            ("INGEST_ENABLE_FAIR_VALUE", "true"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingCredential {
                frequency: FrequencyKind::FairValue,
                ..
            }
        ));

        let config = load(&[
            ("POLYGON_API_KEY", "key"),
            ("POLYGON_FMV_API_KEY", "fmv-key"),
            ("INGEST_ENABLE_FAIR_VALUE", "1"),
        ])
        .unwrap();
        assert_eq!(
            config.feeds.credential_for(FrequencyKind::FairValue),
            Ok("fmv-key")
        );
        assert_eq!(
            config.feeds.url_for(FrequencyKind::FairValue),
            DEFAULT_FAIR_VALUE_URL
        );
    }

    #[test]
    fn blank_key_counts_as_missing() {
        assert!(load(&[("POLYGON_API_KEY", "   ")]).is_err());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("POLYGON_API_KEY", "key"),
            ("INGEST_ENABLE_MINUTE_AGGREGATES", "yes"),
            ("INGEST_SYMBOLS", "aapl, msft,,TSLA"),
            ("INGEST_HEARTBEAT_TIMEOUT_SECS", "45"),
            ("INGEST_MAX_RECONNECT_ATTEMPTS", "0"),
            ("INGEST_RECONNECT_JITTER", "0.2"),
            ("INGEST_BUFFER_CAPACITY", "50"),
            ("REDIS_URL", "redis://localhost:6379"),
            ("INGEST_HEALTH_PORT", "9000"),
        ])
        .unwrap();
        assert_eq!(
            config.feeds.enabled_frequencies(),
            vec![FrequencyKind::PerSecond, FrequencyKind::PerMinute]
        );
        assert_eq!(config.feeds.symbols, vec!["AAPL", "MSFT", "TSLA"]);
        assert_eq!(config.websocket.heartbeat_timeout, Duration::from_secs(45));
        assert_eq!(config.websocket.max_reconnect_attempts, 0);
        assert!((config.websocket.reconnect_jitter - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.publisher.buffer_capacity, 50);
        assert_eq!(
            config.publisher.redis_url.as_deref(),
            Some("redis://localhost:6379")
        );
        assert_eq!(config.server.health_port, 9000);
    }

    #[test]
    fn unparsable_values_fall_back_to_defaults() {
        let config = load(&[
            ("POLYGON_API_KEY", "key"),
            ("INGEST_BUFFER_CAPACITY", "lots"),
            ("INGEST_ENABLE_MINUTE_AGGREGATES", "maybe"),
        ])
        .unwrap();
        assert_eq!(config.publisher.buffer_capacity, 1_000);
        assert!(!config.feeds.enable_minute_aggregates);
    }

    #[test_case("INGEST_HEARTBEAT_INTERVAL_SECS", "0" ; "zero heartbeat interval")]
    #[test_case("INGEST_HEARTBEAT_TIMEOUT_SECS", "0" ; "zero heartbeat timeout")]
    #[test_case("INGEST_STATS_INTERVAL_SECS", "0" ; "zero stats interval")]
    #[test_case("INGEST_AUTH_TIMEOUT_SECS", "0" ; "zero auth timeout")]
    #[test_case("INGEST_CONNECT_TIMEOUT_SECS", "0" ; "zero connect timeout")]
    #[test_case("INGEST_RECONNECT_JITTER", "NaN" ; "nan jitter")]
    #[test_case("INGEST_RECONNECT_JITTER", "inf" ; "infinite jitter")]
    #[test_case("INGEST_RECONNECT_JITTER", "-0.1" ; "negative jitter")]
    #[test_case("INGEST_RECONNECT_JITTER", "1.5" ; "jitter above one")]
    fn out_of_range_values_are_rejected(variable: &'static str, value: &str) {
        let err = load(&[("POLYGON_API_KEY", "key"), (variable, value)]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { variable: v, .. } if v == variable));
        assert!(err.to_string().starts_with(variable));
    }

    #[test]
    fn boundary_jitter_is_accepted() {
        let config = load(&[
            ("POLYGON_API_KEY", "key"),
            ("INGEST_RECONNECT_JITTER", "1"),
            ("INGEST_HEARTBEAT_INTERVAL_SECS", "1"),
        ])
        .unwrap();
        assert!((config.websocket.reconnect_jitter - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.websocket.heartbeat_interval, Duration::from_secs(1));
    }

    #[test]
    fn secrets_redacted_debug() {
        let config = load(&[
            ("POLYGON_API_KEY", "key123"),
            ("REDIS_URL", "redis://:hunter2@localhost"),
        ])
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("key123"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("[REDACTED]"));
    }
}
