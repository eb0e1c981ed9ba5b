//! Fan-out of server events to rooms and users.
//!
//! Delivery is fire-and-forget per recipient: each connection has its own
//! bounded queue, and a full or closed queue only affects that recipient.

use std::collections::HashSet;
use std::sync::Arc;

use super::events::ServerEvent;
use super::registry::{ConnectionHandle, ConnectionRegistry};
use super::session::{ConnectionId, Delivery};

/// Cloneable broadcaster over the shared registry.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ConnectionRegistry>,
}

impl Broadcaster {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver to every connection subscribed to `room_id`, except `exclude`.
    /// Returns the number of connections the event was queued for.
    pub fn to_room(
        &self,
        room_id: i64,
        event: ServerEvent,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let targets = self.registry.room_members(room_id);
        let targets = targets
            .iter()
            .filter(|h| Some(&h.connection_id) != exclude);
        deliver(targets, event)
    }

    /// Deliver to every live connection of `user_id`.
    pub fn to_user(&self, user_id: i64, event: ServerEvent) -> usize {
        let targets = self.registry.by_user(user_id);
        deliver(targets.iter(), event)
    }

    /// Deliver to every live connection of each listed user. Each connection
    /// receives the event once even if a user is listed twice.
    pub fn to_users(&self, user_ids: &[i64], event: ServerEvent) -> usize {
        let mut seen = HashSet::new();
        let targets: Vec<ConnectionHandle> = user_ids
            .iter()
            .filter(|&&user_id| seen.insert(user_id))
            .flat_map(|&user_id| self.registry.by_user(user_id))
            .collect();
        deliver(targets.iter(), event)
    }
}

fn deliver<'a>(targets: impl Iterator<Item = &'a ConnectionHandle>, event: ServerEvent) -> usize {
    let event = Arc::new(event);
    let mut delivered = 0;
    for target in targets {
        if !target.outbound.is_open() {
            continue;
        }
        match target.outbound.deliver(event.clone()) {
            Delivery::Queued => delivered += 1,
            Delivery::Dropped => {
                tracing::warn!(
                    connection_id = %target.connection_id,
                    event = event.t,
                    "outbound queue full, dropping event"
                );
            }
            Delivery::Closed => {
                tracing::debug!(connection_id = %target.connection_id, "recipient already closed");
            }
        }
    }
    delivered
}
