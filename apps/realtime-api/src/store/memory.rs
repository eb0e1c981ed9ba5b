use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use fellowship_common::SnowflakeGenerator;
use parking_lot::RwLock;

use super::{MembershipStore, MessageStore, UserDirectory};
use crate::error::GatewayError;
use crate::models::community_member::{is_moderator_role, CommunityMember};
use crate::models::message::{ChatMessage, DirectMessage, NewChatMessage, NewDirectMessage};
use crate::models::room::Room;
use crate::models::user::UserProfile;

#[derive(Default)]
struct Data {
    rooms: HashMap<i64, Room>,
    /// community id -> owner user id
    owners: HashMap<i64, i64>,
    members: HashMap<(i64, i64), CommunityMember>,
    users: HashMap<i64, UserProfile>,
    chat_messages: Vec<ChatMessage>,
    direct_messages: Vec<DirectMessage>,
}

/// In-memory implementation of every store trait, for development and tests.
///
/// Seeding helpers stand in for the community application's CRUD routes.
pub struct MemoryStore {
    data: RwLock<Data>,
    ids: SnowflakeGenerator,
    fail_writes: AtomicBool,
    fail_history: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            data: RwLock::new(Data::default()),
            ids: SnowflakeGenerator::new(0),
            fail_writes: AtomicBool::new(false),
            fail_history: AtomicBool::new(false),
        }
    }

    pub fn add_user(&self, id: i64, username: &str, display_name: Option<&str>) {
        self.data.write().users.insert(
            id,
            UserProfile {
                id,
                username: username.to_string(),
                display_name: display_name.map(str::to_string),
                avatar_url: None,
            },
        );
    }

    pub fn add_community(&self, id: i64, owner_id: i64) {
        self.data.write().owners.insert(id, owner_id);
    }

    pub fn add_room(&self, id: i64, community_id: i64, name: &str, is_private: bool) {
        self.data.write().rooms.insert(
            id,
            Room {
                id,
                community_id,
                name: name.to_string(),
                is_private,
            },
        );
    }

    pub fn add_member(&self, community_id: i64, user_id: i64, role: &str) {
        self.data.write().members.insert(
            (community_id, user_id),
            CommunityMember {
                community_id,
                user_id,
                role: role.to_string(),
            },
        );
    }

    pub fn remove_member(&self, community_id: i64, user_id: i64) {
        self.data.write().members.remove(&(community_id, user_id));
    }

    /// Make every subsequent write fail with an upstream error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent history read fail with an upstream error.
    pub fn set_fail_history(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    /// All persisted messages of a room, in persistence order.
    pub fn chat_messages(&self, room_id: i64) -> Vec<ChatMessage> {
        self.data
            .read()
            .chat_messages
            .iter()
            .filter(|m| m.room_id == room_id)
            .cloned()
            .collect()
    }

    pub fn direct_messages(&self) -> Vec<DirectMessage> {
        self.data.read().direct_messages.clone()
    }

    fn check_writable(&self) -> Result<(), GatewayError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            tracing::error!("memory store write rejected (failure injected)");
            return Err(GatewayError::internal());
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn get_room(&self, room_id: i64) -> Result<Option<Room>, GatewayError> {
        Ok(self.data.read().rooms.get(&room_id).cloned())
    }

    async fn is_member(&self, community_id: i64, user_id: i64) -> Result<bool, GatewayError> {
        let data = self.data.read();
        Ok(data.owners.get(&community_id) == Some(&user_id)
            || data.members.contains_key(&(community_id, user_id)))
    }

    async fn is_moderator(&self, community_id: i64, user_id: i64) -> Result<bool, GatewayError> {
        let data = self.data.read();
        if data.owners.get(&community_id) == Some(&user_id) {
            return Ok(true);
        }
        Ok(data
            .members
            .get(&(community_id, user_id))
            .is_some_and(|m| is_moderator_role(&m.role)))
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_chat_message(
        &self,
        message: NewChatMessage<'_>,
    ) -> Result<ChatMessage, GatewayError> {
        self.check_writable()?;
        let stored = ChatMessage {
            id: self.ids.generate(),
            room_id: message.room_id,
            sender_id: message.sender_id,
            content: message.content.to_string(),
            is_announcement: message.is_announcement,
            created_at: message.created_at,
        };
        self.data.write().chat_messages.push(stored.clone());
        Ok(stored)
    }

    async fn recent_messages(
        &self,
        room_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, GatewayError> {
        if self.fail_history.load(Ordering::SeqCst) {
            tracing::error!(room_id, "memory store history read rejected (failure injected)");
            return Err(GatewayError::internal());
        }
        let data = self.data.read();
        let mut recent: Vec<ChatMessage> = data
            .chat_messages
            .iter()
            .rev()
            .filter(|m| m.room_id == room_id)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn create_direct_message(
        &self,
        message: NewDirectMessage<'_>,
    ) -> Result<DirectMessage, GatewayError> {
        self.check_writable()?;
        let stored = DirectMessage {
            id: self.ids.generate(),
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content.to_string(),
            created_at: message.created_at,
        };
        self.data.write().direct_messages.push(stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn get_user(&self, user_id: i64) -> Result<Option<UserProfile>, GatewayError> {
        Ok(self.data.read().users.get(&user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn new_message(room_id: i64, content: &str) -> NewChatMessage<'_> {
        NewChatMessage {
            room_id,
            sender_id: 1,
            content,
            is_announcement: false,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn recent_messages_are_oldest_first_and_limited() {
        let store = MemoryStore::new();
        for content in ["one", "two", "three", "four"] {
            store.create_chat_message(new_message(100, content)).await.unwrap();
        }
        store.create_chat_message(new_message(200, "other room")).await.unwrap();

        let recent = store.recent_messages(100, 3).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["two", "three", "four"]);
    }

    #[tokio::test]
    async fn owner_is_member_and_moderator() {
        let store = MemoryStore::new();
        store.add_community(10, 1);
        store.add_member(10, 2, "member");
        store.add_member(10, 3, "moderator");

        assert!(store.is_member(10, 1).await.unwrap());
        assert!(store.is_moderator(10, 1).await.unwrap());
        assert!(store.is_member(10, 2).await.unwrap());
        assert!(!store.is_moderator(10, 2).await.unwrap());
        assert!(store.is_moderator(10, 3).await.unwrap());
        assert!(!store.is_member(10, 4).await.unwrap());
    }

    #[tokio::test]
    async fn removed_member_loses_membership() {
        let store = MemoryStore::new();
        store.add_member(10, 2, "member");
        store.remove_member(10, 2);
        assert!(!store.is_member(10, 2).await.unwrap());
    }

    #[tokio::test]
    async fn injected_failure_rejects_writes() {
        let store = MemoryStore::new();
        store.set_fail_writes(true);
        let err = store.create_chat_message(new_message(100, "x")).await.unwrap_err();
        assert_eq!(err.code, "INTERNAL_ERROR");
        assert!(store.chat_messages(100).is_empty());
    }

    #[tokio::test]
    async fn injected_failure_rejects_history_reads() {
        let store = MemoryStore::new();
        store.create_chat_message(new_message(100, "x")).await.unwrap();
        store.set_fail_history(true);
        let err = store.recent_messages(100, 10).await.unwrap_err();
        assert_eq!(err.code, "INTERNAL_ERROR");

        store.set_fail_history(false);
        assert_eq!(store.recent_messages(100, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn persisted_ids_are_unique() {
        let store = MemoryStore::new();
        let a = store.create_chat_message(new_message(100, "a")).await.unwrap();
        let b = store.create_chat_message(new_message(100, "b")).await.unwrap();
        assert_ne!(a.id, b.id);
    }
}
