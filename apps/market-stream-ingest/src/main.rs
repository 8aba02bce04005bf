//! Market Stream Ingest Binary
//!
//! Starts the multi-frequency ingest pipeline.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin market-stream-ingest
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `POLYGON_API_KEY`: Key for the aggregate channels
//! - `POLYGON_FMV_API_KEY`: Key for the fair value channel, when enabled
//!
//! ## Optional
//! - `INGEST_ENABLE_SECOND_AGGREGATES` / `INGEST_ENABLE_MINUTE_AGGREGATES` /
//!   `INGEST_ENABLE_FAIR_VALUE`: Channel switches (default: true / false / false)
//! - `INGEST_SYMBOLS`: Comma-separated symbols subscribed whenever a channel goes live
//! - `REDIS_URL`: Distribution bus; buffer-only when unset or unreachable
//! - `INGEST_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use market_stream_ingest::application::ports::DistributionBus;
use market_stream_ingest::infrastructure::health::{HealthServer, HealthServerState};
use market_stream_ingest::infrastructure::telemetry;
use market_stream_ingest::{
    DistributionPublisher, EventRouter, FeedOrchestrator, IngestConfig, IngestPipeline,
    PublisherConfig, PublisherSettings, PublishingProcessor, RedisBus, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("initializing telemetry")?;

    tracing::info!("Starting Market Stream Ingest");

    let _metrics_handle = init_metrics().context("installing Prometheus recorder")?;

    let config = IngestConfig::from_env().context("loading configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Distribution
    let bus = connect_bus(&config.publisher).await;
    let publisher = Arc::new(DistributionPublisher::new(
        PublisherConfig::from(&config.publisher),
        bus,
    ));

    // Routing
    let router = Arc::new(EventRouter::new());
    for frequency in config.feeds.enabled_frequencies() {
        router.register_processor(
            frequency,
            Arc::new(PublishingProcessor::new(Arc::clone(&publisher))),
        );
    }
    let pipeline = Arc::new(IngestPipeline::new(router));

    // Feed
    let orchestrator = Arc::new(
        FeedOrchestrator::configure(
            &config.feeds,
            &config.websocket,
            Arc::clone(&pipeline) as _,
        )
        .context("configuring feed")?,
    );

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&orchestrator),
        pipeline,
        Arc::clone(&publisher),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    let stats_reporter =
        publisher.spawn_stats_reporter(config.publisher.stats_interval, shutdown_token.clone());

    // Configured symbols are subscribed by each channel as it goes live.
    if !orchestrator.connect().await {
        tracing::warn!("No channel went live; channels keep retrying in the background");
    }

    tracing::info!("Market stream ingest ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, orchestrator.disconnect())
        .await
        .is_err()
    {
        tracing::warn!("Feed disconnect timed out");
    }
    let _ = stats_reporter.await;

    let stats = publisher.stats();
    tracing::info!(
        published = stats.published,
        evicted = stats.evicted,
        bus_errors = stats.bus_errors,
        "Market stream ingest stopped"
    );
    Ok(())
}

/// Connect the distribution bus, degrading to buffer-only on failure.
async fn connect_bus(settings: &PublisherSettings) -> Option<Arc<dyn DistributionBus>> {
    let Some(url) = settings.redis_url.as_deref() else {
        tracing::info!("REDIS_URL not set; publishing buffer-only");
        return None;
    };
    match RedisBus::connect(url, settings.bus_connect_timeout).await {
        Ok(bus) => Some(Arc::new(bus)),
        Err(e) => {
            tracing::warn!(error = %e, "Distribution bus unavailable; publishing buffer-only");
            None
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &IngestConfig) {
    tracing::info!(
        frequencies = ?config.feeds.enabled_frequencies(),
        symbols = config.feeds.symbols.len(),
        buffer_capacity = config.publisher.buffer_capacity,
        bus = config.publisher.redis_url.is_some(),
        health_port = config.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        stocks_url = %config.feeds.stocks_url,
        fair_value_url = %config.feeds.fair_value_url,
        "WebSocket endpoints"
    );
}

/// Load .env from the current directory or the nearest ancestor that has one.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        for dir in cwd.ancestors().skip(1) {
            let env_path = dir.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
