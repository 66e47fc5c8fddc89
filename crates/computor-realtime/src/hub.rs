//! Ties connection/subscription bookkeeping to authorization, presence,
//! and concurrent per-connection fan-out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use computor_core::ApiError;
use serde_json::Value;
use uuid::Uuid;

use crate::channel::Channel;
use crate::metrics::WebSocketMetrics;
use crate::registry::{ConnectError, ConnectionRegistry};

/// Reuses the same course-role thresholds as the permission handlers to
/// decide whether a principal may subscribe to a channel.
#[async_trait]
pub trait ChannelAuthorizer: Send + Sync {
    async fn can_subscribe(&self, user_id: Uuid, channel: Channel) -> Result<bool, ApiError>;
}

#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn mark_online(&self, user_id: Uuid, ttl: Duration) -> Result<(), ApiError>;
    async fn clear(&self, user_id: Uuid) -> Result<(), ApiError>;
}

/// Delivers one payload to one connection; implemented in
/// `computor-server` over the real `axum` WebSocket sink.
#[async_trait]
pub trait ConnectionSender: Send + Sync {
    async fn send(&self, connection_id: Uuid, payload: Value) -> Result<(), ApiError>;
}

/// A channel transitioned to having zero local subscribers, or gained its
/// first one; the caller bridges this to a Redis `SUBSCRIBE`/`UNSUBSCRIBE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeAction {
    Subscribe(Channel),
    Unsubscribe(Channel),
}

pub struct RealtimeHub<A: ChannelAuthorizer, S: ConnectionSender, P: PresenceStore> {
    registry: ConnectionRegistry,
    authorizer: A,
    sender: S,
    presence: P,
    metrics: WebSocketMetrics,
    presence_ttl: Duration,
    send_timeout: Duration,
}

impl<A: ChannelAuthorizer, S: ConnectionSender, P: PresenceStore> RealtimeHub<A, S, P> {
    pub fn new(
        max_total_connections: usize,
        max_connections_per_user: usize,
        presence_ttl: Duration,
        send_timeout: Duration,
        authorizer: A,
        sender: S,
        presence: P,
    ) -> Self {
        Self {
            registry: ConnectionRegistry::new(max_total_connections, max_connections_per_user),
            authorizer,
            sender,
            presence,
            metrics: WebSocketMetrics::default(),
            presence_ttl,
            send_timeout,
        }
    }

    pub fn metrics(&self) -> &WebSocketMetrics {
        &self.metrics
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Accept a new connection, enforcing both connection limits and
    /// setting presence.
    pub async fn connect(&self, user_id: Uuid) -> Result<Uuid, ConnectError> {
        let connection_id = self.registry.register(user_id)?;
        self.metrics.record_connect();
        if self.presence.mark_online(user_id, self.presence_ttl).await.is_err() {
            tracing::warn!(%user_id, "failed to set websocket presence");
        }
        Ok(connection_id)
    }

    pub async fn subscribe(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        raw_channel: &str,
    ) -> Result<Option<BridgeAction>, ApiError> {
        let channel: Channel = raw_channel
            .parse()
            .map_err(|e: crate::channel::ChannelParseError| ApiError::validation(e.to_string()))?;

        if !self.authorizer.can_subscribe(user_id, channel).await? {
            return Err(ApiError::forbidden("not authorized to subscribe to this channel"));
        }

        let first_subscriber = self.registry.subscribe(connection_id, channel);
        self.metrics.record_subscribe();
        Ok(first_subscriber.then_some(BridgeAction::Subscribe(channel)))
    }

    pub fn unsubscribe(&self, connection_id: Uuid, channel: Channel) -> Option<BridgeAction> {
        let drained = self.registry.unsubscribe(connection_id, channel);
        self.metrics.record_unsubscribe();
        drained.then_some(BridgeAction::Unsubscribe(channel))
    }

    /// Disconnect cleanup cascading across every locally-subscribed
    /// channel.
    pub async fn disconnect(&self, connection_id: Uuid, user_id: Uuid) -> Vec<BridgeAction> {
        let drained = self.registry.deregister(connection_id);
        self.metrics.record_disconnect();
        if self.registry.connections_for_user(user_id) == 0 {
            let _ = self.presence.clear(user_id).await;
        }
        drained.into_iter().map(BridgeAction::Unsubscribe).collect()
    }

    /// Fans a payload out to every local subscriber of `channel`,
    /// concurrently, with a per-send timeout. Per-connection ordering with a single publisher is
    /// preserved by awaiting sequentially per connection, but different
    /// connections send concurrently with each other.
    pub async fn publish_local(&self, channel: Channel, payload: Value) {
        let user_ids = self.registry.subscribers_of(channel);
        let sends: Vec<_> = user_ids
            .into_iter()
            .flat_map(|user_id| self.registry.connection_ids_of_user(user_id))
            .map(|connection_id| {
                let payload = payload.clone();
                async move {
                    let outcome = tokio::time::timeout(
                        self.send_timeout,
                        self.sender.send(connection_id, payload),
                    )
                    .await;
                    match outcome {
                        Ok(Ok(())) => self.metrics.record_send_success(),
                        _ => self.metrics.record_send_failure(),
                    }
                }
            })
            .collect();
        futures::future::join_all(sends).await;
    }
}
