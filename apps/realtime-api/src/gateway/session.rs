//! Per-connection identity and outbound queue.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::events::ServerEvent;

/// Opaque handle of a live connection (`conn_` prefixed ULID).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(Arc<str>);

impl ConnectionId {
    pub fn generate() -> Self {
        Self(
            fellowship_common::id::prefixed_ulid(fellowship_common::id::prefix::CONNECTION).into(),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type OutboundReceiver = mpsc::Receiver<Arc<ServerEvent>>;

/// Result of handing an event to a connection's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The queue is full; the event was dropped for this recipient.
    Dropped,
    /// The connection's writer is gone.
    Closed,
}

/// Sending half of a connection's bounded outbound queue. The writer task
/// owns the receiving half; once it exits the handle reports closed.
#[derive(Debug, Clone)]
pub struct Outbound {
    tx: mpsc::Sender<Arc<ServerEvent>>,
}

impl Outbound {
    pub fn channel(capacity: usize) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Never waits.
    pub fn deliver(&self, event: Arc<ServerEvent>) -> Delivery {
        match self.tx.try_send(event) {
            Ok(()) => Delivery::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Dropped,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

/// State for a single authenticated connection, as seen by event handlers.
/// Room subscriptions live in the registry, not here.
pub struct GatewaySession {
    pub connection_id: ConnectionId,
    /// Authenticated user id. Immutable for the connection's lifetime.
    pub user_id: i64,
    /// Display name cached at handshake, used for system notices.
    pub display_name: String,
    pub outbound: Outbound,
}

impl GatewaySession {
    pub fn new(user_id: i64, display_name: String, outbound: Outbound) -> Self {
        Self {
            connection_id: ConnectionId::generate(),
            user_id,
            display_name,
            outbound,
        }
    }

    /// Send an event to this connection only.
    pub fn send(&self, event: ServerEvent) -> Delivery {
        let delivery = self.outbound.deliver(Arc::new(event));
        if delivery == Delivery::Dropped {
            tracing::warn!(
                connection_id = %self.connection_id,
                "outbound queue full, dropping event"
            );
        }
        delivery
    }
}
