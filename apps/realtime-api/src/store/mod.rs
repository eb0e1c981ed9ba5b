//! Interfaces to the community application's data: rooms, memberships,
//! users and message persistence.
//!
//! The gateway never caches anything it reads through these traits; every
//! authorization decision is a fresh call.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::models::message::{ChatMessage, DirectMessage, NewChatMessage, NewDirectMessage};
use crate::models::room::Room;
use crate::models::user::UserProfile;

/// Room lookup and community membership checks.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn get_room(&self, room_id: i64) -> Result<Option<Room>, GatewayError>;
    async fn is_member(&self, community_id: i64, user_id: i64) -> Result<bool, GatewayError>;
    /// Owners count as moderators.
    async fn is_moderator(&self, community_id: i64, user_id: i64) -> Result<bool, GatewayError>;
}

/// Durable message storage. A returned message has been committed.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_chat_message(
        &self,
        message: NewChatMessage<'_>,
    ) -> Result<ChatMessage, GatewayError>;

    /// The most recent `limit` messages of a room, oldest first.
    async fn recent_messages(
        &self,
        room_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, GatewayError>;

    async fn create_direct_message(
        &self,
        message: NewDirectMessage<'_>,
    ) -> Result<DirectMessage, GatewayError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, user_id: i64) -> Result<Option<UserProfile>, GatewayError>;
}

/// The set of backends the gateway reads from and writes to.
#[derive(Clone)]
pub struct Stores {
    pub membership: Arc<dyn MembershipStore>,
    pub messages: Arc<dyn MessageStore>,
    pub users: Arc<dyn UserDirectory>,
}

impl Stores {
    /// Use one in-memory store for every role.
    pub fn memory(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            membership: store.clone(),
            messages: store.clone(),
            users: store,
        }
    }

    /// Use one PostgreSQL-backed store for every role.
    pub fn postgres(store: postgres::PgStore) -> Self {
        let store = Arc::new(store);
        Self {
            membership: store.clone(),
            messages: store.clone(),
            users: store,
        }
    }
}
