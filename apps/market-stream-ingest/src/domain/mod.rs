//! Domain Layer - Core streaming types and business logic.
//!
//! Pure types for normalized market data, channel lifecycle, subscription
//! tracking and bounded buffering. Nothing here performs I/O.

/// Bounded drop-oldest event buffer.
pub mod buffer;

/// Market events, frequencies and connection states.
pub mod streaming;

/// Per-channel subscription tracking.
pub mod subscription;
