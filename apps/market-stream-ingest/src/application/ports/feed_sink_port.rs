//! Feed Sink Port (Driver Port)
//!
//! Everything the channel layer produces enters the pipeline here: normalized
//! events and connection status changes share one path.

use async_trait::async_trait;

use crate::domain::streaming::FeedNotification;

/// Port receiving feed notifications in arrival order per channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeedSink: Send + Sync {
    /// Deliver one notification.
    async fn deliver(&self, notification: FeedNotification);
}
