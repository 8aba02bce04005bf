//! Distribution Bus Adapters
//!
//! Implementations of the `DistributionBus` port.

mod redis_bus;

pub use redis_bus::RedisBus;
