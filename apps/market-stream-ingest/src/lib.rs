#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Market Stream Ingest - Multi-Frequency Market Data Pipeline
//!
//! Maintains one authenticated WebSocket connection per enabled data
//! frequency, normalizes vendor messages into typed events, routes them to a
//! processor per frequency and fans them out to a Redis pub/sub bus.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Core types with no I/O
//!   - `streaming`: Frequencies, normalized events, connection states
//!   - `subscription`: Per-channel subscription diffing
//!   - `buffer`: Bounded drop-oldest event buffer
//!
//! - **Application**: Ports and services
//!   - `ports`: Event processors, distribution bus, feed sink
//!   - `services`: Event router, distribution publisher, ingest pipeline
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `polygon`: Channel connections and the feed orchestrator
//!   - `bus`: Redis pub/sub
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! A.*   WS ──┐
//!            │    ┌──────────────┐    ┌─────────────┐    ┌─────────────┐
//! AM.*  WS ──┼───►│ Orchestrator │───►│   Router    │───►│  Publisher  │──► market:<SYM>
//!            │    │ (normalize)  │    │ (per freq)  │    │  (buffer)   │──► market:all
//! FMV.* WS ──┘    └──────────────┘    └─────────────┘    └─────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no external dependencies.
pub mod domain;

/// Application layer - Ports and services.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::buffer::EventBuffer;
pub use domain::streaming::{
    ConnectionState, EventDetail, EventKind, FeedNotification, FrequencyKind, MarketEvent,
    MarketSession, StatusEvent,
};
pub use domain::subscription::{SubscriptionSet, Symbol};

// Application ports and services
pub use application::ports::{
    BusError, DistributionBus, EventProcessor, FeedSink, ProcessorError, processor_fn,
};
pub use application::services::{
    DistributionPublisher, EventRouter, IngestPipeline, PublishOutcome, PublisherConfig,
    PublisherStats, PublishingProcessor, RouteStats,
};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, FeedSettings, IngestConfig, PublisherSettings, ServerSettings, WebSocketSettings,
};

// Feed
pub use infrastructure::polygon::{
    ChannelConnection, ConnectionSnapshot, Connectivity, FeedOrchestrator,
};

// Bus
pub use infrastructure::bus::RedisBus;

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
