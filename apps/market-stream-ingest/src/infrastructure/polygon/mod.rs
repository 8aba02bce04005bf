//! Polygon WebSocket Adapters
//!
//! One authenticated socket per data frequency:
//!
//! - **Per-second aggregates**: `A.*` on the stocks cluster
//! - **Per-minute aggregates**: `AM.*` on the stocks cluster
//! - **Fair value**: `FMV.*` on the business cluster, with its own key
//!
//! `connection` runs a single channel; `orchestrator` owns the set and
//! normalizes their messages.

pub mod auth;
pub mod codec;
pub mod connection;
pub mod heartbeat;
pub mod messages;
pub mod orchestrator;
pub mod reconnect;

pub use auth::{AuthError, AuthHandler, AuthState, Credentials};
pub use codec::{CodecError, JsonCodec};
pub use connection::{
    ChannelConnection, ChannelObserver, ConnectionConfig, ConnectionError, ConnectionSnapshot,
};
pub use heartbeat::{HeartbeatConfig, HeartbeatEvent, HeartbeatState, HeartbeatSupervisor};
pub use messages::{ControlAction, ControlRequest, PolygonMessage, StatusKind, StatusMessage};
pub use orchestrator::{Connectivity, FeedOrchestrator, Normalizer, normalize};
pub use reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
