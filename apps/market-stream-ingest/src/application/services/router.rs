//! Event Router
//!
//! Dispatches normalized events to the processor registered for their
//! frequency. A failing or panicking processor is contained: it is counted
//! against its own frequency and never reaches the caller.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;

use crate::application::ports::EventProcessor;
use crate::domain::streaming::{FrequencyKind, MarketEvent};
use crate::infrastructure::metrics::{self, RouteOutcome};

/// Counters for one frequency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouteStats {
    /// Events handed to the router with a processor registered.
    pub routed: u64,
    /// Events the processor accepted.
    pub success: u64,
    /// Malformed events, processor errors and processor panics.
    pub error: u64,
}

#[derive(Debug, Default)]
struct Counters {
    routed: AtomicU64,
    success: AtomicU64,
    error: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> RouteStats {
        RouteStats {
            routed: self.routed.load(Ordering::Relaxed),
            success: self.success.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
        }
    }
}

/// Routes events to one processor per frequency.
#[derive(Default)]
pub struct EventRouter {
    processors: RwLock<HashMap<FrequencyKind, Arc<dyn EventProcessor>>>,
    counters: [Counters; 3],
}

impl EventRouter {
    /// Create a router with no processors.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the processor for a frequency, replacing any previous one.
    pub fn register_processor(&self, frequency: FrequencyKind, processor: Arc<dyn EventProcessor>) {
        let replaced = self.processors.write().insert(frequency, processor).is_some();
        tracing::info!(frequency = %frequency, replaced, "Processor registered");
    }

    /// Route one event.
    ///
    /// Returns `false` without touching any counter when no processor is
    /// registered. Malformed events, processor errors and processor panics
    /// count as errors for `frequency` and return `false`.
    pub async fn route(&self, event: &MarketEvent, frequency: FrequencyKind) -> bool {
        let Some(processor) = self.processors.read().get(&frequency).cloned() else {
            tracing::trace!(frequency = %frequency, symbol = %event.symbol, "No processor registered");
            metrics::record_routed(frequency, RouteOutcome::Unrouted);
            return false;
        };

        let counters = &self.counters[frequency.index()];
        counters.routed.fetch_add(1, Ordering::Relaxed);

        if !event.is_well_formed() {
            tracing::warn!(
                frequency = %frequency,
                symbol = %event.symbol,
                price = event.price,
                timestamp = event.timestamp,
                "Dropping malformed event"
            );
            return self.fail(frequency);
        }

        let started = Instant::now();
        let outcome = AssertUnwindSafe(processor.process(event))
            .catch_unwind()
            .await;
        metrics::record_processing_duration(frequency, started.elapsed());

        match outcome {
            Ok(Ok(())) => {
                counters.success.fetch_add(1, Ordering::Relaxed);
                metrics::record_routed(frequency, RouteOutcome::Success);
                true
            }
            Ok(Err(e)) => {
                tracing::error!(
                    frequency = %frequency,
                    symbol = %event.symbol,
                    error = %e,
                    "Processor failed"
                );
                self.fail(frequency)
            }
            Err(panic) => {
                tracing::error!(
                    frequency = %frequency,
                    symbol = %event.symbol,
                    panic = panic_message(panic.as_ref()),
                    "Processor panicked"
                );
                self.fail(frequency)
            }
        }
    }

    /// Per-frequency counters for every frequency that has a processor or
    /// has routed an event.
    #[must_use]
    pub fn health(&self) -> BTreeMap<FrequencyKind, RouteStats> {
        let registered = self.processors.read();
        FrequencyKind::ALL
            .into_iter()
            .filter_map(|frequency| {
                let stats = self.counters[frequency.index()].snapshot();
                (registered.contains_key(&frequency) || stats.routed > 0)
                    .then_some((frequency, stats))
            })
            .collect()
    }

    /// Counters for one frequency.
    #[must_use]
    pub fn stats(&self, frequency: FrequencyKind) -> RouteStats {
        self.counters[frequency.index()].snapshot()
    }

    fn fail(&self, frequency: FrequencyKind) -> bool {
        self.counters[frequency.index()]
            .error
            .fetch_add(1, Ordering::Relaxed);
        metrics::record_routed(frequency, RouteOutcome::Error);
        false
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registered: Vec<FrequencyKind> = self.processors.read().keys().copied().collect();
        f.debug_struct("EventRouter")
            .field("processors", &registered)
            .field("health", &self.health())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic>")
}
