//! Wire-format frames and event names.
//!
//! Every WebSocket text frame is a JSON object `{"t": <event>, "d": <data>}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;
use crate::models::NumericId;

/// Event names, shared with existing clients.
pub struct EventName;

impl EventName {
    // Client → server
    pub const JOIN_ROOM: &'static str = "join_room";
    pub const LEAVE_ROOM: &'static str = "leave_room";
    /// Inbound: post to a room. Outbound: direct message delivery.
    pub const NEW_MESSAGE: &'static str = "new_message";
    pub const TYPING: &'static str = "typing";
    pub const SEND_DM: &'static str = "send_dm";

    // Server → client
    pub const ROOM_JOINED: &'static str = "room_joined";
    pub const ROOM_LEFT: &'static str = "room_left";
    pub const MESSAGE_HISTORY: &'static str = "message_history";
    pub const MESSAGE_RECEIVED: &'static str = "message_received";
    pub const USER_TYPING: &'static str = "user_typing";
    pub const ERROR: &'static str = "error";
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// A frame sent from the server to the client.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ServerEvent {
    pub t: &'static str,
    pub d: Value,
}

impl ServerEvent {
    pub fn new(t: &'static str, d: Value) -> Self {
        Self { t, d }
    }

    pub fn error(err: &GatewayError) -> Self {
        Self {
            t: EventName::ERROR,
            d: serde_json::to_value(err.payload()).unwrap_or(Value::Null),
        }
    }
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// A raw frame received from the client.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    pub t: String,
    #[serde(default)]
    pub d: Value,
}

/// Room payload: either a bare id or `{ "roomId": id }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RoomPayload {
    Bare(NumericId),
    #[serde(rename_all = "camelCase")]
    Object { room_id: NumericId },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewMessagePayload {
    room_id: NumericId,
    #[serde(default)]
    content: String,
    #[serde(default)]
    sender_id: Option<NumericId>,
    #[serde(default)]
    is_announcement: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TypingPayload {
    room_id: NumericId,
    #[serde(default)]
    user_id: Option<NumericId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendDmPayload {
    #[serde(default)]
    sender_id: Option<NumericId>,
    receiver_id: NumericId,
    #[serde(default)]
    content: String,
}

/// A validated client event. Identity fields are the ids the client claimed;
/// handlers compare them against the authenticated user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    JoinRoom {
        room_id: i64,
    },
    LeaveRoom {
        room_id: i64,
    },
    ChatMessage {
        room_id: i64,
        content: String,
        sender_id: Option<i64>,
        is_announcement: bool,
    },
    Typing {
        room_id: i64,
        user_id: Option<i64>,
    },
    DirectMessage {
        sender_id: Option<i64>,
        receiver_id: i64,
        content: String,
    },
}

impl ClientEvent {
    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self, GatewayError> {
        let frame: ClientFrame = serde_json::from_str(text)
            .map_err(|_| GatewayError::validation("Frame is not a valid event"))?;
        Self::from_frame(frame)
    }

    pub fn from_frame(frame: ClientFrame) -> Result<Self, GatewayError> {
        match frame.t.as_str() {
            EventName::JOIN_ROOM => Ok(ClientEvent::JoinRoom {
                room_id: room_id(frame.d)?,
            }),
            EventName::LEAVE_ROOM => Ok(ClientEvent::LeaveRoom {
                room_id: room_id(frame.d)?,
            }),
            EventName::NEW_MESSAGE => {
                let p: NewMessagePayload = payload(frame.d)?;
                Ok(ClientEvent::ChatMessage {
                    room_id: id_field(&p.room_id, "roomId")?,
                    content: p.content,
                    sender_id: optional_id(p.sender_id.as_ref(), "senderId")?,
                    is_announcement: p.is_announcement.unwrap_or(false),
                })
            }
            EventName::TYPING => {
                let p: TypingPayload = payload(frame.d)?;
                Ok(ClientEvent::Typing {
                    room_id: id_field(&p.room_id, "roomId")?,
                    user_id: optional_id(p.user_id.as_ref(), "userId")?,
                })
            }
            EventName::SEND_DM => {
                let p: SendDmPayload = payload(frame.d)?;
                Ok(ClientEvent::DirectMessage {
                    sender_id: optional_id(p.sender_id.as_ref(), "senderId")?,
                    receiver_id: id_field(&p.receiver_id, "receiverId")?,
                    content: p.content,
                })
            }
            other => Err(GatewayError::unknown_event(other)),
        }
    }

    /// The wire name this event arrived under.
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::JoinRoom { .. } => EventName::JOIN_ROOM,
            ClientEvent::LeaveRoom { .. } => EventName::LEAVE_ROOM,
            ClientEvent::ChatMessage { .. } => EventName::NEW_MESSAGE,
            ClientEvent::Typing { .. } => EventName::TYPING,
            ClientEvent::DirectMessage { .. } => EventName::SEND_DM,
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(d: Value) -> Result<T, GatewayError> {
    serde_json::from_value(d).map_err(|e| GatewayError::validation(format!("Invalid payload: {e}")))
}

fn room_id(d: Value) -> Result<i64, GatewayError> {
    let id = match payload::<RoomPayload>(d)
        .map_err(|_| GatewayError::validation("roomId is required"))?
    {
        RoomPayload::Bare(id) => id,
        RoomPayload::Object { room_id } => room_id,
    };
    id_field(&id, "roomId")
}

fn id_field(id: &NumericId, field: &str) -> Result<i64, GatewayError> {
    id.value()
        .ok_or_else(|| GatewayError::validation(format!("{field} must be a number")))
}

fn optional_id(id: Option<&NumericId>, field: &str) -> Result<Option<i64>, GatewayError> {
    id.map(|id| id_field(id, field)).transpose()
}
