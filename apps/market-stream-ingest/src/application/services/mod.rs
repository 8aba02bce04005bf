//! Application Services
//!
//! Services that sit between the channel layer and downstream consumers.
//!
//! - `EventRouter`: Per-frequency dispatch with failure isolation
//! - `DistributionPublisher`: Bounded buffering and bus fan-out
//! - `IngestPipeline`: Feed sink joining the two

mod pipeline;
mod publisher;
mod router;

pub use pipeline::IngestPipeline;
pub use publisher::{
    DistributionPublisher, LocalSubscriber, PublishOutcome, PublisherConfig, PublisherStats,
    PublishingProcessor,
};
pub use router::{EventRouter, RouteStats};
