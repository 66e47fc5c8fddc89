//! # computor-realtime
//!
//! WebSocket connection fan-out: connection limits,
//! presence, channel subscriptions, and the Redis pub/sub bridge
//! boundary.

pub mod channel;
pub mod hub;
pub mod metrics;
pub mod registry;

pub use channel::{Channel, ChannelParseError};
pub use hub::{BridgeAction, ChannelAuthorizer, ConnectionSender, PresenceStore, RealtimeHub};
pub use metrics::{WebSocketMetrics, WebSocketMetricsSnapshot};
pub use registry::{ConnectError, ConnectionRegistry, CONNECTION_LIMIT_CLOSE_CODE};
