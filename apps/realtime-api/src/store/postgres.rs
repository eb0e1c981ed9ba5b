use async_trait::async_trait;
use diesel::prelude::*;
use diesel::result::OptionalExtension;

use super::{MembershipStore, MessageStore, UserDirectory};
use crate::db::pool::DbPool;
use crate::db::schema::{chat_messages, chat_rooms, communities, community_members, direct_messages, users};
use crate::error::GatewayError;
use crate::models::community_member::is_moderator_role;
use crate::models::message::{ChatMessage, DirectMessage, NewChatMessage, NewDirectMessage};
use crate::models::room::Room;
use crate::models::user::UserProfile;

/// Store backed by the community application's PostgreSQL database.
pub struct PgStore {
    db: DbPool,
}

impl PgStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    async fn is_owner(&self, community_id: i64, user_id: i64) -> Result<bool, GatewayError> {
        let mut conn = self.db.get().await?;

        let count: i64 = diesel_async::RunQueryDsl::get_result(
            communities::table
                .filter(communities::id.eq(community_id))
                .filter(communities::owner_id.eq(user_id))
                .count(),
            &mut conn,
        )
        .await?;

        Ok(count > 0)
    }
}

#[async_trait]
impl MembershipStore for PgStore {
    async fn get_room(&self, room_id: i64) -> Result<Option<Room>, GatewayError> {
        let mut conn = self.db.get().await?;

        let room = diesel_async::RunQueryDsl::get_result(
            chat_rooms::table.find(room_id).select(Room::as_select()),
            &mut conn,
        )
        .await
        .optional()?;

        Ok(room)
    }

    async fn is_member(&self, community_id: i64, user_id: i64) -> Result<bool, GatewayError> {
        if self.is_owner(community_id, user_id).await? {
            return Ok(true);
        }

        let mut conn = self.db.get().await?;

        let count: i64 = diesel_async::RunQueryDsl::get_result(
            community_members::table
                .filter(community_members::community_id.eq(community_id))
                .filter(community_members::user_id.eq(user_id))
                .count(),
            &mut conn,
        )
        .await?;

        Ok(count > 0)
    }

    async fn is_moderator(&self, community_id: i64, user_id: i64) -> Result<bool, GatewayError> {
        if self.is_owner(community_id, user_id).await? {
            return Ok(true);
        }

        let mut conn = self.db.get().await?;

        let role: Option<String> = diesel_async::RunQueryDsl::get_result(
            community_members::table
                .find((community_id, user_id))
                .select(community_members::role),
            &mut conn,
        )
        .await
        .optional()?;

        Ok(role.is_some_and(|r| is_moderator_role(&r)))
    }
}

#[async_trait]
impl MessageStore for PgStore {
    async fn create_chat_message(
        &self,
        message: NewChatMessage<'_>,
    ) -> Result<ChatMessage, GatewayError> {
        let mut conn = self.db.get().await?;

        let stored = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(chat_messages::table)
                .values(&message)
                .returning(ChatMessage::as_returning()),
            &mut conn,
        )
        .await?;

        Ok(stored)
    }

    async fn recent_messages(
        &self,
        room_id: i64,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, GatewayError> {
        let mut conn = self.db.get().await?;

        let mut recent: Vec<ChatMessage> = diesel_async::RunQueryDsl::load(
            chat_messages::table
                .filter(chat_messages::room_id.eq(room_id))
                .order((chat_messages::created_at.desc(), chat_messages::id.desc()))
                .limit(limit as i64)
                .select(ChatMessage::as_select()),
            &mut conn,
        )
        .await?;

        recent.reverse();
        Ok(recent)
    }

    async fn create_direct_message(
        &self,
        message: NewDirectMessage<'_>,
    ) -> Result<DirectMessage, GatewayError> {
        let mut conn = self.db.get().await?;

        let stored = diesel_async::RunQueryDsl::get_result(
            diesel::insert_into(direct_messages::table)
                .values(&message)
                .returning(DirectMessage::as_returning()),
            &mut conn,
        )
        .await?;

        Ok(stored)
    }
}

#[async_trait]
impl UserDirectory for PgStore {
    async fn get_user(&self, user_id: i64) -> Result<Option<UserProfile>, GatewayError> {
        let mut conn = self.db.get().await?;

        let user = diesel_async::RunQueryDsl::get_result(
            users::table.find(user_id).select(UserProfile::as_select()),
            &mut conn,
        )
        .await
        .optional()?;

        Ok(user)
    }
}
