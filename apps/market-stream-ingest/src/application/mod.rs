//! Application Layer - Ports and services.
//!
//! Ports describe what the pipeline needs from the outside (processors, a
//! distribution bus) and what it offers (a feed sink). Services implement
//! routing and distribution against those ports.

/// Port interfaces for processors, the distribution bus and the feed sink.
pub mod ports;

/// Routing, publishing and the pipeline sink.
pub mod services;
