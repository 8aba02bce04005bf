//! Application Ports (Driver and Driven)
//!
//! Ports define the seams between the pipeline and the outside world.
//! - **Driver Ports** (Inbound): `FeedSink` receives everything channels produce
//! - **Driven Ports** (Outbound): `EventProcessor` consumes routed events,
//!   `DistributionBus` carries published payloads

mod distribution_bus_port;
mod event_processor_port;
mod feed_sink_port;

pub use distribution_bus_port::{BusError, DistributionBus};
pub use event_processor_port::{EventProcessor, FnProcessor, ProcessorError, processor_fn};
pub use feed_sink_port::FeedSink;

#[cfg(test)]
pub use distribution_bus_port::MockDistributionBus;
#[cfg(test)]
pub use event_processor_port::MockEventProcessor;
#[cfg(test)]
pub use feed_sink_port::MockFeedSink;
