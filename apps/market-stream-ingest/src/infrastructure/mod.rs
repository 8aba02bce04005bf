//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the application ports plus the process-level
//! concerns (configuration, health, metrics, tracing).

/// Polygon WebSocket channels and the multi-channel orchestrator.
pub mod polygon;

/// Distribution bus adapters (Redis pub/sub).
pub mod bus;

/// Environment configuration.
pub mod config;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
