//! Per-connection lifecycle and channel subscription bookkeeping
//!. Purely in-memory; the Redis bridge layered on top
//! decides when to actually `SUBSCRIBE`/`UNSUBSCRIBE` based on whether
//! this instance still has local subscribers for a channel.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use uuid::Uuid;

use crate::channel::Channel;

/// WebSocket close code used whenever a connection limit is exceeded.
pub const CONNECTION_LIMIT_CLOSE_CODE: u16 = 4008;

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("WS_MAX_TOTAL_CONNECTIONS exceeded")]
    TotalLimitExceeded,
    #[error("WS_MAX_CONNECTIONS_PER_USER exceeded")]
    PerUserLimitExceeded,
}

impl ConnectError {
    pub fn close_code(&self) -> u16 {
        CONNECTION_LIMIT_CLOSE_CODE
    }
}

pub struct ConnectionRegistry {
    max_total: usize,
    max_per_user: usize,
    total: AtomicUsize,
    connections_by_user: DashMap<Uuid, HashSet<Uuid>>,
    connection_user: DashMap<Uuid, Uuid>,
    connection_channels: DashMap<Uuid, HashSet<Channel>>,
    channel_subscribers: DashMap<Channel, HashSet<Uuid>>,
}

impl ConnectionRegistry {
    pub fn new(max_total: usize, max_per_user: usize) -> Self {
        Self {
            max_total,
            max_per_user,
            total: AtomicUsize::new(0),
            connections_by_user: DashMap::new(),
            connection_user: DashMap::new(),
            connection_channels: DashMap::new(),
            channel_subscribers: DashMap::new(),
        }
    }

    /// Registers a new connection for `user_id`, enforcing both limits.
    pub fn register(&self, user_id: Uuid) -> Result<Uuid, ConnectError> {
        if self.total.load(Ordering::SeqCst) >= self.max_total {
            return Err(ConnectError::TotalLimitExceeded);
        }
        let mut entry = self.connections_by_user.entry(user_id).or_default();
        if entry.len() >= self.max_per_user {
            return Err(ConnectError::PerUserLimitExceeded);
        }
        let connection_id = Uuid::new_v4();
        entry.insert(connection_id);
        drop(entry);
        self.connection_user.insert(connection_id, user_id);
        self.total.fetch_add(1, Ordering::SeqCst);
        Ok(connection_id)
    }

    /// Cascades the disconnect cleanup:
    /// unsubscribes from every locally-held channel, returns the subset
    /// that lost their last local subscriber (the Redis bridge should
    /// `UNSUBSCRIBE` from these).
    pub fn deregister(&self, connection_id: Uuid) -> Vec<Channel> {
        let mut drained = Vec::new();
        if let Some((_, channels)) = self.connection_channels.remove(&connection_id) {
            for channel in channels {
                if self.remove_subscriber(channel, connection_id) {
                    drained.push(channel);
                }
            }
        }
        if let Some((_, user_id)) = self.connection_user.remove(&connection_id) {
            if let Some(mut set) = self.connections_by_user.get_mut(&user_id) {
                set.remove(&connection_id);
            }
            self.total.fetch_sub(1, Ordering::SeqCst);
        }
        drained
    }

    /// Returns `true` if this is the first local subscriber for the
    /// channel (the Redis bridge should `SUBSCRIBE`).
    pub fn subscribe(&self, connection_id: Uuid, channel: Channel) -> bool {
        self.connection_channels
            .entry(connection_id)
            .or_default()
            .insert(channel);
        let mut subscribers = self.channel_subscribers.entry(channel).or_default();
        let was_empty = subscribers.is_empty();
        if let Some(user_id) = self.connection_user.get(&connection_id) {
            subscribers.insert(*user_id);
        }
        was_empty
    }

    /// Returns `true` if the channel lost its last local subscriber.
    pub fn unsubscribe(&self, connection_id: Uuid, channel: Channel) -> bool {
        if let Some(mut channels) = self.connection_channels.get_mut(&connection_id) {
            channels.remove(&channel);
        }
        self.remove_subscriber(channel, connection_id)
    }

    fn remove_subscriber(&self, channel: Channel, connection_id: Uuid) -> bool {
        let Some(user_id) = self.connection_user.get(&connection_id).map(|r| *r) else {
            return false;
        };
        // Only drop the user from the channel's subscriber set once none of
        // their other connections are still subscribed to it.
        let still_subscribed = self
            .connection_channels
            .iter()
            .any(|entry| *entry.key() != connection_id && entry.value().contains(&channel) && {
                self.connection_user.get(entry.key()).map(|u| *u) == Some(user_id)
            });
        if still_subscribed {
            return false;
        }
        if let Some(mut subscribers) = self.channel_subscribers.get_mut(&channel) {
            subscribers.remove(&user_id);
            if subscribers.is_empty() {
                drop(subscribers);
                self.channel_subscribers.remove(&channel);
                return true;
            }
        }
        false
    }

    pub fn subscribers_of(&self, channel: Channel) -> Vec<Uuid> {
        self.channel_subscribers
            .get(&channel)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn total_connections(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn connections_for_user(&self, user_id: Uuid) -> usize {
        self.connections_by_user.get(&user_id).map(|s| s.len()).unwrap_or(0)
    }

    pub fn connection_ids_of_user(&self, user_id: Uuid) -> Vec<Uuid> {
        self.connections_by_user
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_beyond_total_limit() {
        let registry = ConnectionRegistry::new(1, 10);
        registry.register(Uuid::new_v4()).unwrap();
        let err = registry.register(Uuid::new_v4()).unwrap_err();
        assert_eq!(err.close_code(), 4008);
    }

    #[test]
    fn rejects_beyond_per_user_limit() {
        let registry = ConnectionRegistry::new(10, 1);
        let user = Uuid::new_v4();
        registry.register(user).unwrap();
        assert!(registry.register(user).is_err());
    }

    #[test]
    fn first_subscriber_triggers_redis_subscribe() {
        let registry = ConnectionRegistry::new(10, 10);
        let conn = registry.register(Uuid::new_v4()).unwrap();
        let channel = Channel::Course(Uuid::new_v4());
        assert!(registry.subscribe(conn, channel));
        let conn2 = registry.register(Uuid::new_v4()).unwrap();
        assert!(!registry.subscribe(conn2, channel));
    }

    #[test]
    fn disconnect_cascades_unsubscribe_from_every_channel() {
        let registry = ConnectionRegistry::new(10, 10);
        let conn = registry.register(Uuid::new_v4()).unwrap();
        let channel_a = Channel::Course(Uuid::new_v4());
        let channel_b = Channel::SubmissionGroup(Uuid::new_v4());
        registry.subscribe(conn, channel_a);
        registry.subscribe(conn, channel_b);

        let drained = registry.deregister(conn);
        assert_eq!(drained.len(), 2);
        assert_eq!(registry.subscribers_of(channel_a).len(), 0);
        assert_eq!(registry.total_connections(), 0);
    }

    #[test]
    fn last_subscriber_leaving_triggers_redis_unsubscribe() {
        let registry = ConnectionRegistry::new(10, 10);
        let conn1 = registry.register(Uuid::new_v4()).unwrap();
        let conn2 = registry.register(Uuid::new_v4()).unwrap();
        let channel = Channel::Course(Uuid::new_v4());
        registry.subscribe(conn1, channel);
        registry.subscribe(conn2, channel);

        assert!(!registry.unsubscribe(conn1, channel));
        assert!(registry.unsubscribe(conn2, channel));
    }
}
