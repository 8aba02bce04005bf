//! Event Processor Port (Driven Port)
//!
//! Interface for the per-frequency consumers of routed events (publishing,
//! anomaly detection, automation).

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::streaming::MarketEvent;

/// Processor failure. Always contained by the router.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessorError {
    /// The processor rejected or failed on the event.
    #[error("processor failed: {message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },
}

impl ProcessorError {
    /// Convenience constructor.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Port for a frequency's event consumer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventProcessor: Send + Sync {
    /// Process one event.
    async fn process(&self, event: &MarketEvent) -> Result<(), ProcessorError>;
}

/// Adapter turning an async closure into an [`EventProcessor`].
pub struct FnProcessor<F> {
    func: F,
}

impl<F> FnProcessor<F> {
    /// Wrap a closure.
    #[must_use]
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> EventProcessor for FnProcessor<F>
where
    F: Fn(MarketEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProcessorError>> + Send,
{
    async fn process(&self, event: &MarketEvent) -> Result<(), ProcessorError> {
        (self.func)(event.clone()).await
    }
}

/// Shared processor from an async closure.
pub fn processor_fn<F, Fut>(func: F) -> Arc<dyn EventProcessor>
where
    F: Fn(MarketEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ProcessorError>> + Send + 'static,
{
    Arc::new(FnProcessor::new(func))
}
