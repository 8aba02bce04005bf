//! Ingest Pipeline
//!
//! Entry point for everything the channel layer produces. Events go to the
//! router under their own frequency; status changes are kept as the latest
//! known status per frequency for health reporting.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::router::EventRouter;
use crate::application::ports::FeedSink;
use crate::domain::streaming::{FeedNotification, FrequencyKind, StatusEvent};

/// Feed sink that routes events and records status changes.
#[derive(Debug)]
pub struct IngestPipeline {
    router: Arc<EventRouter>,
    statuses: RwLock<BTreeMap<FrequencyKind, StatusEvent>>,
}

impl IngestPipeline {
    /// Create a pipeline over a router.
    #[must_use]
    pub fn new(router: Arc<EventRouter>) -> Self {
        Self {
            router,
            statuses: RwLock::new(BTreeMap::new()),
        }
    }

    /// The router events are dispatched through.
    #[must_use]
    pub const fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Latest status reported by a frequency.
    #[must_use]
    pub fn latest_status(&self, frequency: FrequencyKind) -> Option<StatusEvent> {
        self.statuses.read().get(&frequency).cloned()
    }

    /// Latest status of every frequency that has reported.
    #[must_use]
    pub fn statuses(&self) -> BTreeMap<FrequencyKind, StatusEvent> {
        self.statuses.read().clone()
    }
}

#[async_trait]
impl FeedSink for IngestPipeline {
    async fn deliver(&self, notification: FeedNotification) {
        match notification {
            FeedNotification::Event(event) => {
                let frequency = event.frequency;
                self.router.route(&event, frequency).await;
            }
            FeedNotification::Status(status) => {
                tracing::debug!(
                    frequency = %status.frequency,
                    state = %status.state,
                    detail = status.detail.as_deref().unwrap_or(""),
                    "Feed status"
                );
                self.statuses.write().insert(status.frequency, status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::processor_fn;
    use crate::domain::streaming::{ConnectionState, EventDetail, MarketEvent};

    fn fair_value(symbol: &str) -> MarketEvent {
        MarketEvent {
            symbol: symbol.to_string(),
            price: 10.0,
            volume: 0,
            timestamp: 1_700_000_000.0,
            frequency: FrequencyKind::FairValue,
            detail: EventDetail::FairValue { fair_value: 10.0 },
        }
    }

    #[tokio::test]
    async fn events_are_routed_by_their_frequency() {
        let router = Arc::new(EventRouter::new());
        router.register_processor(
            FrequencyKind::FairValue,
            processor_fn(|_event: MarketEvent| async { Ok(()) }),
        );
        let pipeline = IngestPipeline::new(Arc::clone(&router));

        pipeline
            .deliver(FeedNotification::Event(fair_value("AAPL")))
            .await;
        assert_eq!(router.stats(FrequencyKind::FairValue).success, 1);
        assert_eq!(router.stats(FrequencyKind::PerSecond).routed, 0);
    }

    #[tokio::test]
    async fn latest_status_is_kept() {
        let pipeline = IngestPipeline::new(Arc::new(EventRouter::new()));
        for state in [ConnectionState::Connecting, ConnectionState::Connected] {
            pipeline
                .deliver(FeedNotification::Status(StatusEvent {
                    frequency: FrequencyKind::PerMinute,
                    state,
                    detail: None,
                }))
                .await;
        }

        let status = pipeline.latest_status(FrequencyKind::PerMinute).unwrap();
        assert_eq!(status.state, ConnectionState::Connected);
        assert!(pipeline.latest_status(FrequencyKind::PerSecond).is_none());
        assert_eq!(pipeline.statuses().len(), 1);
    }
}
