//! Inbound event dispatch: join/leave, room messages, typing, direct messages
//! and disconnect cleanup.
//!
//! Authorization is checked against the stores on every event. Nothing the
//! stores return is cached on the connection, so a membership revoked
//! mid-session takes effect on the next message.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures_util::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::{ErrorClass, GatewayError};
use crate::models::message::{ChatMessage, DirectMessage, NewChatMessage, NewDirectMessage};
use crate::models::user::UserProfile;
use crate::notify::{Notification, NotificationDispatcher};
use crate::store::Stores;

use super::events::{ClientEvent, EventName, ServerEvent};
use super::fanout::Broadcaster;
use super::registry::ConnectionRegistry;
use super::session::{ConnectionId, GatewaySession};

/// Characters of message content included in a notification body.
const PREVIEW_CHARS: usize = 100;

/// Sender details attached to broadcast messages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SenderInfo {
    id: i64,
    username: String,
    display_name: String,
    avatar_url: Option<String>,
}

impl SenderInfo {
    fn fallback(user_id: i64, cached_name: Option<&str>) -> Self {
        let name = cached_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("user{user_id}"));
        Self {
            id: user_id,
            username: name.clone(),
            display_name: name,
            avatar_url: None,
        }
    }
}

impl From<UserProfile> for SenderInfo {
    fn from(profile: UserProfile) -> Self {
        Self {
            id: profile.id,
            display_name: profile.shown_name().to_string(),
            username: profile.username,
            avatar_url: profile.avatar_url,
        }
    }
}

#[derive(Serialize)]
struct RoomMessagePayload<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    message: &'a ChatMessage,
    sender: &'a SenderInfo,
}

#[derive(Serialize)]
struct DirectMessagePayload<'a> {
    #[serde(flatten)]
    message: &'a DirectMessage,
    sender: &'a SenderInfo,
    receiver: &'a SenderInfo,
}

#[derive(Debug, Clone, Copy)]
enum SystemNotice {
    Joined,
    Left,
    Disconnected,
}

impl SystemNotice {
    fn as_str(self) -> &'static str {
        match self {
            SystemNotice::Joined => "joined",
            SystemNotice::Left => "left",
            SystemNotice::Disconnected => "disconnected",
        }
    }

    fn event(self, room_id: i64, user_id: i64, username: &str) -> ServerEvent {
        let content = match self {
            SystemNotice::Joined => format!("{username} joined the room"),
            SystemNotice::Left => format!("{username} left the room"),
            SystemNotice::Disconnected => format!("{username} disconnected"),
        };
        ServerEvent::new(
            EventName::MESSAGE_RECEIVED,
            json!({
                "type": "system",
                "event": self.as_str(),
                "roomId": room_id,
                "userId": user_id,
                "username": username,
                "content": content,
                "createdAt": Utc::now(),
            }),
        )
    }
}

/// Encode an outbound payload. A failure is reported, never sent as `null`.
fn encode<T: Serialize>(payload: T) -> Result<Value, GatewayError> {
    serde_json::to_value(payload).map_err(|e| {
        tracing::error!(?e, "failed to encode event payload");
        GatewayError::internal()
    })
}

fn room_message(message: &ChatMessage, sender: &SenderInfo) -> Result<Value, GatewayError> {
    let kind = if message.is_announcement {
        "announcement"
    } else {
        "message"
    };
    encode(RoomMessagePayload {
        kind,
        message,
        sender,
    })
}

fn preview(content: &str) -> String {
    if content.chars().count() <= PREVIEW_CHARS {
        return content.to_string();
    }
    let mut short: String = content.chars().take(PREVIEW_CHARS).collect();
    short.push('…');
    short
}

/// Routes client events to handlers and owns the shared connection state.
pub struct ChatGateway {
    registry: Arc<ConnectionRegistry>,
    broadcast: Broadcaster,
    stores: Stores,
    notifier: Arc<dyn NotificationDispatcher>,
    history_limit: usize,
    max_message_length: usize,
}

impl ChatGateway {
    pub fn new(stores: Stores, notifier: Arc<dyn NotificationDispatcher>, config: &Config) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            broadcast: Broadcaster::new(registry.clone()),
            registry,
            stores,
            notifier,
            history_limit: config.history_limit,
            max_message_length: config.max_message_length,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Record a freshly authenticated connection.
    pub fn connect(&self, session: &GatewaySession) {
        self.registry.register(session);
    }

    /// Parse and dispatch one text frame.
    pub async fn handle_frame(&self, session: &GatewaySession, text: &str) {
        match ClientEvent::parse(text) {
            Ok(event) => self.dispatch(session, event).await,
            Err(err) => self.report(session, "frame", &err),
        }
    }

    /// Run one event to completion. Any failure, including a panic inside a
    /// handler, becomes a single `error` event on the originating connection.
    pub async fn dispatch(&self, session: &GatewaySession, event: ClientEvent) {
        let name = event.name();
        let result = match AssertUnwindSafe(self.route(session, event))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(
                    connection_id = %session.connection_id,
                    user_id = session.user_id,
                    event = name,
                    "event handler panicked"
                );
                Err(GatewayError::internal())
            }
        };

        if let Err(err) = result {
            self.report(session, name, &err);
        }
    }

    /// Purge a connection and tell each of its rooms it went away.
    pub fn disconnect(&self, connection_id: &ConnectionId) {
        let Some(removed) = self.registry.unregister(connection_id) else {
            return;
        };

        for &room_id in &removed.rooms {
            self.broadcast.to_room(
                room_id,
                SystemNotice::Disconnected.event(room_id, removed.user_id, &removed.display_name),
                None,
            );
        }

        tracing::info!(
            connection_id = %connection_id,
            user_id = removed.user_id,
            rooms = removed.rooms.len(),
            "connection unregistered"
        );
    }

    async fn route(&self, session: &GatewaySession, event: ClientEvent) -> Result<(), GatewayError> {
        match event {
            ClientEvent::JoinRoom { room_id } => self.join_room(session, room_id).await,
            ClientEvent::LeaveRoom { room_id } => {
                self.leave_room(session, room_id);
                Ok(())
            }
            ClientEvent::ChatMessage {
                room_id,
                content,
                sender_id,
                is_announcement,
            } => {
                self.chat_message(session, room_id, &content, sender_id, is_announcement)
                    .await
            }
            ClientEvent::Typing { room_id, user_id } => self.typing(session, room_id, user_id),
            ClientEvent::DirectMessage {
                sender_id,
                receiver_id,
                content,
            } => {
                self.direct_message(session, sender_id, receiver_id, &content)
                    .await
            }
        }
    }

    fn report(&self, session: &GatewaySession, event: &str, err: &GatewayError) {
        match err.class {
            ErrorClass::Upstream => tracing::error!(
                connection_id = %session.connection_id,
                user_id = session.user_id,
                event,
                code = err.code,
                "event failed"
            ),
            ErrorClass::Authorization if err.is_impersonation() => tracing::warn!(
                security = true,
                connection_id = %session.connection_id,
                user_id = session.user_id,
                event,
                "impersonation attempt rejected"
            ),
            _ => tracing::debug!(
                connection_id = %session.connection_id,
                user_id = session.user_id,
                event,
                code = err.code,
                message = %err.message,
                "event rejected"
            ),
        }
        session.send(ServerEvent::error(err));
    }

    // -----------------------------------------------------------------------
    // join_room / leave_room
    // -----------------------------------------------------------------------

    async fn join_room(&self, session: &GatewaySession, room_id: i64) -> Result<(), GatewayError> {
        let room = self
            .stores
            .membership
            .get_room(room_id)
            .await?
            .ok_or_else(GatewayError::room_not_found)?;

        if room.is_private
            && !self
                .stores
                .membership
                .is_member(room.community_id, session.user_id)
                .await?
        {
            return Err(GatewayError::access_denied());
        }

        let Some(newly_joined) = self.registry.add_room(&session.connection_id, room.id) else {
            // Disconnected while the membership check was in flight.
            return Ok(());
        };

        // Subscribed before reading history, so a message persisted in between
        // may show up twice (deduplicated by id) but never goes missing.
        let messages = match self.load_history(room.id).await {
            Ok(messages) => messages,
            Err(err) => {
                // A failed join leaves no subscription behind, so a retry is
                // treated as a fresh join.
                if newly_joined {
                    self.registry.remove_room(&session.connection_id, room.id);
                }
                return Err(err);
            }
        };

        session.send(ServerEvent::new(
            EventName::ROOM_JOINED,
            json!({
                "roomId": room.id,
                "communityId": room.community_id,
                "name": room.name,
            }),
        ));
        session.send(ServerEvent::new(
            EventName::MESSAGE_HISTORY,
            json!({ "roomId": room.id, "messages": messages }),
        ));

        if newly_joined {
            self.broadcast.to_room(
                room.id,
                SystemNotice::Joined.event(room.id, session.user_id, &session.display_name),
                Some(&session.connection_id),
            );
        }

        tracing::debug!(
            connection_id = %session.connection_id,
            user_id = session.user_id,
            room_id = room.id,
            "joined room"
        );
        Ok(())
    }

    fn leave_room(&self, session: &GatewaySession, room_id: i64) {
        let was_subscribed = self.registry.remove_room(&session.connection_id, room_id);

        session.send(ServerEvent::new(
            EventName::ROOM_LEFT,
            json!({ "roomId": room_id }),
        ));

        if was_subscribed {
            self.broadcast.to_room(
                room_id,
                SystemNotice::Left.event(room_id, session.user_id, &session.display_name),
                None,
            );
        }
    }

    // -----------------------------------------------------------------------
    // new_message
    // -----------------------------------------------------------------------

    async fn chat_message(
        &self,
        session: &GatewaySession,
        room_id: i64,
        content: &str,
        claimed_sender: Option<i64>,
        is_announcement: bool,
    ) -> Result<(), GatewayError> {
        if claimed_sender.is_some_and(|id| id != session.user_id) {
            return Err(GatewayError::impersonation());
        }
        if !self.registry.is_subscribed(&session.connection_id, room_id) {
            return Err(GatewayError::not_in_room());
        }
        let content = self.validate_content(content)?;

        let room = self
            .stores
            .membership
            .get_room(room_id)
            .await?
            .ok_or_else(GatewayError::room_not_found)?;

        if !self
            .stores
            .membership
            .is_member(room.community_id, session.user_id)
            .await?
        {
            return Err(GatewayError::not_a_member());
        }

        if is_announcement
            && !self
                .stores
                .membership
                .is_moderator(room.community_id, session.user_id)
                .await?
        {
            return Err(GatewayError::not_moderator());
        }

        let sender = self
            .sender_info(session.user_id, Some(&session.display_name))
            .await?;

        let message = self
            .stores
            .messages
            .create_chat_message(NewChatMessage {
                room_id: room.id,
                sender_id: session.user_id,
                content,
                is_announcement,
                created_at: Utc::now(),
            })
            .await?;

        let delivered = self.broadcast.to_room(
            room.id,
            ServerEvent::new(EventName::MESSAGE_RECEIVED, room_message(&message, &sender)?),
            None,
        );

        tracing::debug!(
            connection_id = %session.connection_id,
            user_id = session.user_id,
            room_id = room.id,
            message_id = message.id,
            delivered,
            "room message broadcast"
        );

        if is_announcement {
            let notifier = self.notifier.clone();
            let community_id = room.community_id;
            let sender_id = session.user_id;
            let notification = Notification {
                title: format!("Announcement in {}", room.name),
                body: preview(&message.content),
                data: json!({
                    "type": "announcement",
                    "roomId": room.id,
                    "communityId": community_id,
                    "messageId": message.id,
                }),
            };
            tokio::spawn(async move {
                if let Err(err) = notifier
                    .notify_community_members(community_id, notification, vec![sender_id])
                    .await
                {
                    tracing::warn!(community_id, code = err.code, "announcement notification failed");
                }
            });
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // typing
    // -----------------------------------------------------------------------

    fn typing(
        &self,
        session: &GatewaySession,
        room_id: i64,
        claimed_user: Option<i64>,
    ) -> Result<(), GatewayError> {
        if claimed_user.is_some_and(|id| id != session.user_id) {
            return Err(GatewayError::impersonation());
        }

        // Best effort: silently ignored when not subscribed.
        if !self.registry.is_subscribed(&session.connection_id, room_id) {
            return Ok(());
        }

        self.broadcast.to_room(
            room_id,
            ServerEvent::new(
                EventName::USER_TYPING,
                json!({
                    "roomId": room_id,
                    "userId": session.user_id,
                    "username": session.display_name,
                }),
            ),
            Some(&session.connection_id),
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // send_dm
    // -----------------------------------------------------------------------

    async fn direct_message(
        &self,
        session: &GatewaySession,
        claimed_sender: Option<i64>,
        receiver_id: i64,
        content: &str,
    ) -> Result<(), GatewayError> {
        if claimed_sender.is_some_and(|id| id != session.user_id) {
            return Err(GatewayError::impersonation());
        }
        let content = self.validate_content(content)?;

        let receiver: SenderInfo = self
            .stores
            .users
            .get_user(receiver_id)
            .await?
            .ok_or_else(GatewayError::user_not_found)?
            .into();

        let sender = self
            .sender_info(session.user_id, Some(&session.display_name))
            .await?;

        let message = self
            .stores
            .messages
            .create_direct_message(NewDirectMessage {
                sender_id: session.user_id,
                receiver_id,
                content,
                created_at: Utc::now(),
            })
            .await?;

        let payload = encode(DirectMessagePayload {
            message: &message,
            sender: &sender,
            receiver: &receiver,
        })?;

        let delivered = self.broadcast.to_users(
            &[session.user_id, receiver_id],
            ServerEvent::new(EventName::NEW_MESSAGE, payload),
        );

        tracing::debug!(
            connection_id = %session.connection_id,
            user_id = session.user_id,
            receiver_id,
            message_id = message.id,
            delivered,
            "direct message delivered"
        );

        if receiver_id != session.user_id {
            let notifier = self.notifier.clone();
            let notification = Notification {
                title: format!("New message from {}", sender.display_name),
                body: preview(&message.content),
                data: json!({
                    "type": "direct_message",
                    "messageId": message.id,
                    "senderId": session.user_id,
                }),
            };
            tokio::spawn(async move {
                if let Err(err) = notifier.notify_user(receiver_id, notification).await {
                    tracing::warn!(receiver_id, code = err.code, "direct message notification failed");
                }
            });
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn validate_content<'a>(&self, content: &'a str) -> Result<&'a str, GatewayError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(GatewayError::validation("Message content is required"));
        }
        if content.chars().count() > self.max_message_length {
            return Err(GatewayError::validation(format!(
                "Message content must be {} characters or fewer",
                self.max_message_length
            )));
        }
        Ok(content)
    }

    async fn sender_info(
        &self,
        user_id: i64,
        cached_name: Option<&str>,
    ) -> Result<SenderInfo, GatewayError> {
        Ok(match self.stores.users.get_user(user_id).await? {
            Some(profile) => profile.into(),
            None => SenderInfo::fallback(user_id, cached_name),
        })
    }

    async fn load_history(&self, room_id: i64) -> Result<Vec<Value>, GatewayError> {
        let history = self
            .stores
            .messages
            .recent_messages(room_id, self.history_limit)
            .await?;
        self.enrich_history(&history).await
    }

    async fn enrich_history(&self, history: &[ChatMessage]) -> Result<Vec<Value>, GatewayError> {
        let mut senders: HashMap<i64, SenderInfo> = HashMap::new();
        for message in history {
            if !senders.contains_key(&message.sender_id) {
                let info = self.sender_info(message.sender_id, None).await?;
                senders.insert(message.sender_id, info);
            }
        }

        history
            .iter()
            .filter_map(|m| senders.get(&m.sender_id).map(|s| room_message(m, s)))
            .collect()
    }
}
