//! Live connection registry: identity and room subscriptions per connection.

use std::collections::HashSet;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::session::{ConnectionId, GatewaySession, Outbound};

/// Per-connection registry entry.
struct ConnectionEntry {
    user_id: i64,
    display_name: String,
    rooms: HashSet<i64>,
    outbound: Outbound,
}

/// A delivery target returned by [`ConnectionRegistry::room_members`] and
/// [`ConnectionRegistry::by_user`]. Holding one does not keep the connection
/// registered.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub connection_id: ConnectionId,
    pub user_id: i64,
    pub outbound: Outbound,
}

/// What was removed by [`ConnectionRegistry::unregister`].
#[derive(Debug)]
pub struct RemovedConnection {
    pub user_id: i64,
    pub display_name: String,
    pub rooms: Vec<i64>,
}

/// Shared registry of all live connections.
///
/// Uses `DashMap` for shard-level concurrency and `parking_lot::Mutex` per
/// entry for non-poisoning, fast locking. A room index maps each room to its
/// subscribed connections so a room broadcast only touches its members.
/// Lookups return owned snapshots so no lock is held while delivering.
///
/// Lock order is connection shard, then entry, then room index shard. Readers
/// of the room index copy the ids out before touching `connections`.
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Mutex<ConnectionEntry>>,
    rooms: DashMap<i64, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    /// Register a connection after a successful handshake, with no rooms.
    pub fn register(&self, session: &GatewaySession) {
        let entry = ConnectionEntry {
            user_id: session.user_id,
            display_name: session.display_name.clone(),
            rooms: HashSet::new(),
            outbound: session.outbound.clone(),
        };
        self.connections
            .insert(session.connection_id.clone(), Mutex::new(entry));
    }

    /// Subscribe a connection to a room.
    ///
    /// Returns `Some(true)` if newly added, `Some(false)` if already
    /// subscribed, and `None` if the connection is no longer registered.
    pub fn add_room(&self, connection_id: &ConnectionId, room_id: i64) -> Option<bool> {
        let item = self.connections.get(connection_id)?;
        let mut entry = item.lock();
        let added = entry.rooms.insert(room_id);
        if added {
            self.rooms
                .entry(room_id)
                .or_default()
                .insert(connection_id.clone());
        }
        Some(added)
    }

    /// Unsubscribe a connection from a room. Returns whether it was subscribed.
    pub fn remove_room(&self, connection_id: &ConnectionId, room_id: i64) -> bool {
        let Some(item) = self.connections.get(connection_id) else {
            return false;
        };
        let mut entry = item.lock();
        let removed = entry.rooms.remove(&room_id);
        if removed {
            self.unindex(room_id, connection_id);
        }
        removed
    }

    pub fn is_subscribed(&self, connection_id: &ConnectionId, room_id: i64) -> bool {
        self.connections
            .get(connection_id)
            .is_some_and(|entry| entry.lock().rooms.contains(&room_id))
    }

    /// Rooms a connection is subscribed to, sorted.
    pub fn rooms_of(&self, connection_id: &ConnectionId) -> Vec<i64> {
        let Some(entry) = self.connections.get(connection_id) else {
            return Vec::new();
        };
        let mut rooms: Vec<i64> = entry.lock().rooms.iter().copied().collect();
        rooms.sort_unstable();
        rooms
    }

    /// Remove a connection entirely.
    pub fn unregister(&self, connection_id: &ConnectionId) -> Option<RemovedConnection> {
        let (_, entry) = self.connections.remove(connection_id)?;
        let entry = entry.into_inner();
        let mut rooms: Vec<i64> = entry.rooms.into_iter().collect();
        rooms.sort_unstable();
        for &room_id in &rooms {
            self.unindex(room_id, connection_id);
        }
        Some(RemovedConnection {
            user_id: entry.user_id,
            display_name: entry.display_name,
            rooms,
        })
    }

    /// Connections currently subscribed to a room.
    pub fn room_members(&self, room_id: i64) -> Vec<ConnectionHandle> {
        let ids: Vec<ConnectionId> = match self.rooms.get(&room_id) {
            Some(members) => members.iter().cloned().collect(),
            None => return Vec::new(),
        };

        ids.into_iter()
            .filter_map(|connection_id| {
                let item = self.connections.get(&connection_id)?;
                let entry = item.lock();
                // Unsubscribed after the snapshot was taken.
                if !entry.rooms.contains(&room_id) {
                    return None;
                }
                Some(ConnectionHandle {
                    user_id: entry.user_id,
                    outbound: entry.outbound.clone(),
                    connection_id,
                })
            })
            .collect()
    }

    /// All live connections of a user.
    pub fn by_user(&self, user_id: i64) -> Vec<ConnectionHandle> {
        self.connections
            .iter()
            .filter_map(|item| {
                let entry = item.value().lock();
                if entry.user_id != user_id {
                    return None;
                }
                Some(ConnectionHandle {
                    connection_id: item.key().clone(),
                    user_id: entry.user_id,
                    outbound: entry.outbound.clone(),
                })
            })
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of rooms with at least one subscribed connection.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn unindex(&self, room_id: i64, connection_id: &ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(&room_id) {
            members.remove(connection_id);
        }
        self.rooms.remove_if(&room_id, |_, members| members.is_empty());
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::session::OutboundReceiver;

    fn session(user_id: i64) -> (GatewaySession, OutboundReceiver) {
        let (outbound, rx) = Outbound::channel(8);
        (GatewaySession::new(user_id, format!("user{user_id}"), outbound), rx)
    }

    fn ids(handles: &[ConnectionHandle]) -> Vec<ConnectionId> {
        handles.iter().map(|h| h.connection_id.clone()).collect()
    }

    #[test]
    fn register_starts_with_no_rooms() {
        let registry = ConnectionRegistry::new();
        let (s, _rx) = session(1);
        registry.register(&s);

        assert_eq!(registry.connection_count(), 1);
        assert!(registry.rooms_of(&s.connection_id).is_empty());
        assert!(registry.room_members(100).is_empty());
    }

    #[test]
    fn add_room_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (s, _rx) = session(1);
        registry.register(&s);

        assert_eq!(registry.add_room(&s.connection_id, 100), Some(true));
        assert_eq!(registry.add_room(&s.connection_id, 100), Some(false));
        assert_eq!(registry.rooms_of(&s.connection_id), vec![100]);
        assert_eq!(ids(&registry.room_members(100)), vec![s.connection_id.clone()]);
    }

    #[test]
    fn remove_room_reports_previous_subscription() {
        let registry = ConnectionRegistry::new();
        let (s, _rx) = session(1);
        registry.register(&s);
        registry.add_room(&s.connection_id, 100);

        assert!(registry.remove_room(&s.connection_id, 100));
        assert!(!registry.remove_room(&s.connection_id, 100));
        assert!(!registry.is_subscribed(&s.connection_id, 100));
    }

    #[test]
    fn unknown_connection_cannot_join() {
        let registry = ConnectionRegistry::new();
        let (s, _rx) = session(1);
        assert_eq!(registry.add_room(&s.connection_id, 100), None);
        assert!(!registry.remove_room(&s.connection_id, 100));
    }

    #[test]
    fn unregister_removes_from_every_room() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = session(1);
        let (b, _rx_b) = session(2);
        registry.register(&a);
        registry.register(&b);
        registry.add_room(&a.connection_id, 100);
        registry.add_room(&a.connection_id, 200);
        registry.add_room(&b.connection_id, 100);

        let removed = registry.unregister(&a.connection_id).unwrap();
        assert_eq!(removed.user_id, 1);
        assert_eq!(removed.rooms, vec![100, 200]);

        assert_eq!(ids(&registry.room_members(100)), vec![b.connection_id.clone()]);
        assert!(registry.room_members(200).is_empty());
        assert!(registry.unregister(&a.connection_id).is_none());
        assert_eq!(registry.add_room(&a.connection_id, 100), None);
    }

    #[test]
    fn by_user_returns_every_device() {
        let registry = ConnectionRegistry::new();
        let (a1, _rx1) = session(5);
        let (a2, _rx2) = session(5);
        let (other, _rx3) = session(7);
        registry.register(&a1);
        registry.register(&a2);
        registry.register(&other);

        let mut found = ids(&registry.by_user(5));
        found.sort_by(|x, y| x.as_str().cmp(y.as_str()));
        let mut expected = vec![a1.connection_id.clone(), a2.connection_id.clone()];
        expected.sort_by(|x, y| x.as_str().cmp(y.as_str()));
        assert_eq!(found, expected);
    }

    #[test]
    fn concurrent_joins_and_unregisters_leave_no_stale_members() {
        use std::sync::Arc;

        let registry = Arc::new(ConnectionRegistry::new());
        let mut sessions = Vec::new();
        for user in 0..32 {
            let (s, rx) = session(user);
            registry.register(&s);
            sessions.push((s, rx));
        }

        let threads: Vec<_> = sessions
            .iter()
            .map(|(s, _)| {
                let registry = registry.clone();
                let id = s.connection_id.clone();
                std::thread::spawn(move || {
                    for room in 0..50 {
                        registry.add_room(&id, room);
                    }
                    registry.unregister(&id);
                    // Joining after removal must not resurrect the entry.
                    registry.add_room(&id, 0);
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        assert_eq!(registry.connection_count(), 0);
        assert_eq!(registry.room_count(), 0);
        for room in 0..50 {
            assert!(registry.room_members(room).is_empty());
        }
    }

    #[test]
    fn room_index_tracks_only_subscribed_connections() {
        let registry = ConnectionRegistry::new();
        let (a, _rx_a) = session(1);
        let (b, _rx_b) = session(2);
        let (idle, _rx_idle) = session(3);
        registry.register(&a);
        registry.register(&b);
        registry.register(&idle);
        registry.add_room(&a.connection_id, 100);
        registry.add_room(&b.connection_id, 100);
        registry.add_room(&b.connection_id, 200);

        assert_eq!(registry.room_count(), 2);
        assert_eq!(registry.room_members(100).len(), 2);

        registry.remove_room(&a.connection_id, 100);
        registry.remove_room(&b.connection_id, 100);
        assert!(registry.room_members(100).is_empty());
        assert_eq!(registry.room_count(), 1);

        registry.unregister(&b.connection_id);
        assert_eq!(registry.room_count(), 0);
    }
}
