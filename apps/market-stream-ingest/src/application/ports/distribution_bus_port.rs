//! Distribution Bus Port (Driven Port)
//!
//! Interface for the pub/sub bus published events are fanned out to.

use async_trait::async_trait;

/// Distribution bus error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The bus could not be reached.
    #[error("Bus connection error: {message}")]
    ConnectionError {
        /// Underlying error.
        message: String,
    },

    /// The bus refused or failed the publish.
    #[error("Bus publish failed: {message}")]
    PublishFailed {
        /// Underlying error.
        message: String,
    },
}

/// Port for publishing serialized events to named channels.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DistributionBus: Send + Sync {
    /// Publish one payload to one channel.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError>;
}
