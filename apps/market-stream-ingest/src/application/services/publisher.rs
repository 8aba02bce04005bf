//! Distribution Publisher
//!
//! Buffers published events in a bounded drop-oldest buffer and fans each one
//! out to the distribution bus (per-symbol channel and catch-all channel) and
//! an optional in-process subscriber.
//!
//! The bus is optional. Without one the publisher runs buffer-only, and bus
//! failures never fail a publish.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{DistributionBus, EventProcessor, ProcessorError};
use crate::domain::buffer::EventBuffer;
use crate::domain::streaming::{FrequencyKind, MarketEvent};
use crate::infrastructure::metrics;

const MIN_STATS_INTERVAL: Duration = Duration::from_secs(1);

// =============================================================================
// Configuration
// =============================================================================

/// Publisher configuration.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Maximum buffered events.
    pub buffer_capacity: usize,
    /// Bus channel prefix, e.g. `market` gives `market:AAPL` and `market:all`.
    pub channel_prefix: String,
    /// Value of the payload `source` field.
    pub source: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 1000,
            channel_prefix: "market".to_string(),
            source: "polygon".to_string(),
        }
    }
}

impl From<&crate::PublisherSettings> for PublisherConfig {
    fn from(settings: &crate::PublisherSettings) -> Self {
        Self {
            buffer_capacity: settings.buffer_capacity,
            channel_prefix: settings.channel_prefix.clone(),
            source: settings.source.clone(),
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// Result of one publish.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishOutcome {
    /// Event buffered and the payload built; bus failures do not clear it.
    pub success: bool,
    /// Wall time spent publishing.
    pub processing_time_ms: f64,
}

/// Publisher statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PublisherStats {
    /// Events accepted since start.
    pub published: u64,
    /// Events currently buffered.
    pub buffered: usize,
    /// Buffer capacity.
    pub buffer_size: usize,
    /// Whether a bus is attached.
    pub bus_connected: bool,
    /// Events evicted because the buffer was full.
    pub evicted: u64,
    /// Failed bus publishes.
    pub bus_errors: u64,
}

/// Wire payload published to the bus.
#[derive(Debug, Serialize)]
struct EventPayload<'a> {
    event_type: &'static str,
    symbol: &'a str,
    price: f64,
    volume: u64,
    timestamp: f64,
    source: &'a str,
    market_status: &'static str,
    frequency: FrequencyKind,
}

/// In-process subscriber invoked for every published event.
pub type LocalSubscriber = Arc<dyn Fn(&MarketEvent) + Send + Sync>;

// =============================================================================
// Publisher
// =============================================================================

/// Bounded-buffer fan-out publisher.
pub struct DistributionPublisher {
    config: PublisherConfig,
    buffer: Mutex<EventBuffer>,
    bus: Option<Arc<dyn DistributionBus>>,
    subscriber: RwLock<Option<LocalSubscriber>>,
    published: AtomicU64,
    bus_errors: AtomicU64,
}

impl DistributionPublisher {
    /// Create a publisher; `bus = None` runs buffer-only.
    #[must_use]
    pub fn new(config: PublisherConfig, bus: Option<Arc<dyn DistributionBus>>) -> Self {
        let buffer = EventBuffer::new(config.buffer_capacity);
        Self {
            config,
            buffer: Mutex::new(buffer),
            bus,
            subscriber: RwLock::new(None),
            published: AtomicU64::new(0),
            bus_errors: AtomicU64::new(0),
        }
    }

    /// Register the local subscriber, replacing any previous one.
    pub fn set_subscriber(&self, subscriber: LocalSubscriber) {
        *self.subscriber.write() = Some(subscriber);
    }

    /// Channel carrying one symbol's events.
    #[must_use]
    pub fn symbol_channel(&self, symbol: &str) -> String {
        format!("{}:{symbol}", self.config.channel_prefix)
    }

    /// Channel carrying every event.
    #[must_use]
    pub fn all_channel(&self) -> String {
        format!("{}:all", self.config.channel_prefix)
    }

    /// Publish one event.
    pub async fn publish(&self, event: MarketEvent) -> PublishOutcome {
        let started = Instant::now();
        let frequency = event.frequency;

        let evicted = self.buffer.lock().push(event.clone());
        if let Some(evicted) = evicted {
            tracing::trace!(symbol = %evicted.symbol, "Buffer full, evicted oldest event");
            metrics::record_buffer_eviction();
        }
        self.published.fetch_add(1, Ordering::Relaxed);
        metrics::record_published(frequency);

        let payload = match self.payload(&event) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::error!(symbol = %event.symbol, error = %e, "Failed to serialize event");
                None
            }
        };

        if let Some(payload) = payload.as_deref() {
            self.publish_to_bus(&event.symbol, payload).await;
        }

        let subscriber_ok = self.notify_subscriber(&event);

        PublishOutcome {
            success: payload.is_some() && subscriber_ok,
            processing_time_ms: started.elapsed().as_secs_f64() * 1_000.0,
        }
    }

    /// Take every buffered event, oldest first.
    pub fn drain(&self) -> Vec<MarketEvent> {
        self.buffer.lock().drain()
    }

    /// Drop every buffered event.
    pub fn clear(&self) {
        self.buffer.lock().clear();
    }

    /// Buffered events grouped by frequency, oldest first within a group.
    #[must_use]
    pub fn buffered_by_frequency(&self) -> BTreeMap<FrequencyKind, Vec<MarketEvent>> {
        self.buffer.lock().by_frequency()
    }

    /// Current statistics.
    #[must_use]
    pub fn stats(&self) -> PublisherStats {
        let buffer = self.buffer.lock();
        PublisherStats {
            published: self.published.load(Ordering::Relaxed),
            buffered: buffer.len(),
            buffer_size: buffer.capacity(),
            bus_connected: self.bus.is_some(),
            evicted: buffer.evicted(),
            bus_errors: self.bus_errors.load(Ordering::Relaxed),
        }
    }

    /// Spawn the periodic throughput reporter. Intervals under one second
    /// are raised to one second.
    pub fn spawn_stats_reporter(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let publisher = Arc::clone(self);
        let interval = interval.max(MIN_STATS_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last_published = publisher.published.load(Ordering::Relaxed);
            let mut last_tick = Instant::now();

            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::debug!("Stats reporter stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let stats = publisher.stats();
                        let elapsed = last_tick.elapsed().as_secs_f64();
                        let delta = stats.published.saturating_sub(last_published);
                        #[allow(clippy::cast_precision_loss)]
                        let rate = if elapsed > 0.0 { delta as f64 / elapsed } else { 0.0 };
                        last_published = stats.published;
                        last_tick = Instant::now();

                        metrics::set_publisher_gauges(stats.buffered, rate);
                        tracing::info!(
                            events_per_second = rate,
                            published = stats.published,
                            buffered = stats.buffered,
                            evicted = stats.evicted,
                            bus_errors = stats.bus_errors,
                            bus_connected = stats.bus_connected,
                            "Publisher throughput"
                        );
                    }
                }
            }
        })
    }

    fn payload(&self, event: &MarketEvent) -> Result<String, serde_json::Error> {
        serde_json::to_string(&EventPayload {
            event_type: event.kind().as_str(),
            symbol: &event.symbol,
            price: event.price,
            volume: event.volume,
            timestamp: event.timestamp,
            source: &self.config.source,
            market_status: event.market_session().as_str(),
            frequency: event.frequency,
        })
    }

    async fn publish_to_bus(&self, symbol: &str, payload: &str) {
        let Some(bus) = &self.bus else {
            return;
        };
        let symbol_channel = self.symbol_channel(symbol);
        let all_channel = self.all_channel();
        let (by_symbol, all) = futures::join!(
            bus.publish(&symbol_channel, payload),
            bus.publish(&all_channel, payload)
        );
        for (channel, result) in [(symbol_channel, by_symbol), (all_channel, all)] {
            if let Err(e) = result {
                self.bus_errors.fetch_add(1, Ordering::Relaxed);
                metrics::record_bus_error();
                tracing::warn!(channel = %channel, error = %e, "Bus publish failed");
            }
        }
    }

    fn notify_subscriber(&self, event: &MarketEvent) -> bool {
        let Some(subscriber) = self.subscriber.read().clone() else {
            return true;
        };
        if catch_unwind(AssertUnwindSafe(|| subscriber(event))).is_ok() {
            true
        } else {
            tracing::error!(symbol = %event.symbol, "Local subscriber panicked");
            false
        }
    }
}

impl std::fmt::Debug for DistributionPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributionPublisher")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Processor Adapter
// =============================================================================

/// Processor that publishes every routed event.
#[derive(Debug, Clone)]
pub struct PublishingProcessor {
    publisher: Arc<DistributionPublisher>,
}

impl PublishingProcessor {
    /// Wrap a publisher.
    #[must_use]
    pub const fn new(publisher: Arc<DistributionPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl EventProcessor for PublishingProcessor {
    async fn process(&self, event: &MarketEvent) -> Result<(), ProcessorError> {
        let outcome = self.publisher.publish(event.clone()).await;
        if outcome.success {
            Ok(())
        } else {
            Err(ProcessorError::failed(format!(
                "publish of {} did not complete",
                event.symbol
            )))
        }
    }
}
