//! Configuration Module
//!
//! Configuration loading for the ingest service.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_FAIR_VALUE_URL, DEFAULT_STOCKS_URL, FeedSettings, IngestConfig,
    PublisherSettings, ServerSettings, WebSocketSettings,
};
