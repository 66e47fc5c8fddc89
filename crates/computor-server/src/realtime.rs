//! Concrete `axum`/`redis`-backed wiring for the generic [`RealtimeHub`]
//! in `computor-realtime`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use redis::AsyncCommands;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use uuid::Uuid;

use computor_core::{ApiError, CourseRole};
use computor_realtime::{BridgeAction, Channel, ChannelAuthorizer, ConnectionSender, PresenceStore};

use crate::db::PgRepositories;
use crate::state::Hub;

/// A student may subscribe to their own submission-group channel, and
/// `_tutor`+ to any channel within a course they have that role in.
pub struct PermissionChannelAuthorizer {
    repo: PgRepositories,
}

impl PermissionChannelAuthorizer {
    pub fn new(repo: PgRepositories) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl ChannelAuthorizer for PermissionChannelAuthorizer {
    async fn can_subscribe(&self, user_id: Uuid, channel: Channel) -> Result<bool, ApiError> {
        match channel {
            Channel::Course(course_id) => {
                let role: Option<(CourseRole,)> = sqlx::query_as(
                    "SELECT course_role FROM course_members WHERE user_id = $1 AND course_id = $2",
                )
                .bind(user_id)
                .bind(course_id)
                .fetch_optional(&self.repo.pool)
                .await?;
                Ok(role.is_some())
            }
            Channel::CourseContent(content_id) => {
                let row: Option<(Uuid,)> = sqlx::query_as(
                    "SELECT cm.id FROM course_contents cc \
                     JOIN course_members cm ON cm.course_id = cc.course_id \
                     WHERE cc.id = $1 AND cm.user_id = $2",
                )
                .bind(content_id)
                .bind(user_id)
                .fetch_optional(&self.repo.pool)
                .await?;
                Ok(row.is_some())
            }
            Channel::SubmissionGroup(submission_group_id) => {
                let row: Option<(Uuid,)> = sqlx::query_as(
                    "SELECT cm.id FROM submission_group_members sgm \
                     JOIN course_members cm ON cm.id = sgm.course_member_id \
                     WHERE sgm.submission_group_id = $1 AND cm.user_id = $2 \
                     UNION \
                     SELECT cm.id FROM submission_groups sg \
                     JOIN course_members cm ON cm.course_id = sg.course_id \
                     WHERE sg.id = $1 AND cm.user_id = $2 \
                     AND cm.course_role IN ('tutor', 'lecturer', 'maintainer', 'owner')",
                )
                .bind(submission_group_id)
                .bind(user_id)
                .fetch_optional(&self.repo.pool)
                .await?;
                Ok(row.is_some())
            }
        }
    }
}

/// Presence is a short-TTL key per user, refreshed on every `connect`.
pub struct RedisPresence {
    client: redis::Client,
}

impl RedisPresence {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PresenceStore for RedisPresence {
    async fn mark_online(&self, user_id: Uuid, ttl: Duration) -> Result<(), ApiError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn
            .set_ex(format!("presence:{user_id}"), "1", ttl.as_secs().max(1))
            .await?;
        Ok(())
    }

    async fn clear(&self, user_id: Uuid) -> Result<(), ApiError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(format!("presence:{user_id}")).await?;
        Ok(())
    }
}

/// Fans out to the real `axum` WebSocket sink by holding one
/// `SplitSink` per live connection, keyed by the same connection id the
/// hub's registry tracks.
#[derive(Clone, Default)]
pub struct AxumConnectionSender {
    sinks: Arc<DashMap<Uuid, Mutex<SplitSink<WebSocket, WsMessage>>>>,
}

impl AxumConnectionSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection_id: Uuid, sink: SplitSink<WebSocket, WsMessage>) {
        self.sinks.insert(connection_id, Mutex::new(sink));
    }

    pub fn deregister(&self, connection_id: Uuid) {
        self.sinks.remove(&connection_id);
    }
}

#[async_trait]
impl ConnectionSender for AxumConnectionSender {
    async fn send(&self, connection_id: Uuid, payload: Value) -> Result<(), ApiError> {
        let Some(entry) = self.sinks.get(&connection_id) else {
            return Err(ApiError::not_found("connection is no longer registered"));
        };
        let text = serde_json::to_string(&payload)?;
        entry
            .lock()
            .await
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|err| ApiError::external(format!("websocket send failed: {err}")))
    }
}

pub type BridgeSender = mpsc::UnboundedSender<BridgeAction>;

/// Redis pub/sub channels live in the `ws:*` namespace, distinct from the unprefixed `"kind:id"` form clients
/// use in subscribe/unsubscribe envelopes.
fn redis_channel_name(channel: Channel) -> String {
    format!("ws:{channel}")
}

/// The single owner of the Redis pub/sub connection: subscribes/unsubscribes on demand as local
/// subscriber counts cross zero, and fans incoming publications back
/// into the hub's local delivery.
pub fn spawn_redis_bridge(client: redis::Client, hub: Arc<Hub>) -> (BridgeSender, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<BridgeAction>();

    let handle = tokio::spawn(async move {
        let mut pubsub = match client.get_async_pubsub().await {
            Ok(pubsub) => pubsub,
            Err(err) => {
                tracing::error!(%err, "failed to open redis pubsub connection for websocket bridge");
                return;
            }
        };

        loop {
            tokio::select! {
                action = rx.recv() => {
                    match action {
                        Some(BridgeAction::Subscribe(channel)) => {
                            if let Err(err) = pubsub.subscribe(redis_channel_name(channel)).await {
                                tracing::warn!(%err, %channel, "redis SUBSCRIBE failed");
                            }
                        }
                        Some(BridgeAction::Unsubscribe(channel)) => {
                            if let Err(err) = pubsub.unsubscribe(redis_channel_name(channel)).await {
                                tracing::warn!(%err, %channel, "redis UNSUBSCRIBE failed");
                            }
                        }
                        None => break,
                    }
                }
                msg = pubsub.on_message().next() => {
                    let Some(msg) = msg else { continue };
                    let Some(bare) = msg.get_channel_name().strip_prefix("ws:") else { continue };
                    let Ok(channel) = bare.parse::<Channel>() else { continue };
                    let Ok(payload) = msg.get_payload::<String>() else { continue };
                    match serde_json::from_str(&payload) {
                        Ok(value) => hub.publish_local(channel, value).await,
                        Err(err) => tracing::warn!(%err, %channel, "malformed redis-bridged payload"),
                    }
                }
            }
        }
    });

    (tx, handle)
}

/// Publishes to Redis so every instance with local subscribers (including
/// this one, via its own bridge loop) receives the event.
pub async fn publish_to_redis(client: &redis::Client, channel: Channel, payload: &Value) -> Result<(), ApiError> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    let text = serde_json::to_string(payload)?;
    let _: () = conn.publish(redis_channel_name(channel), text).await?;
    Ok(())
}
