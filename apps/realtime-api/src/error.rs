use std::fmt;

use serde::Serialize;

/// Error codes carried in the `error` event sent to clients.
pub mod code {
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const UNKNOWN_EVENT: &str = "UNKNOWN_EVENT";
    pub const ROOM_NOT_FOUND: &str = "ROOM_NOT_FOUND";
    pub const USER_NOT_FOUND: &str = "USER_NOT_FOUND";
    pub const ACCESS_DENIED: &str = "ACCESS_DENIED";
    pub const NOT_IN_ROOM: &str = "NOT_IN_ROOM";
    pub const NOT_A_MEMBER: &str = "NOT_A_MEMBER";
    pub const NOT_MODERATOR: &str = "NOT_MODERATOR";
    pub const IMPERSONATION: &str = "IMPERSONATION";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
}

/// Broad failure class. Decides how an error is logged; every class is
/// terminal for the single event only, never for the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    NotFound,
    Authorization,
    Upstream,
}

/// Body of the `error` event: `{ message, code }`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorPayload {
    pub message: String,
    pub code: &'static str,
}

/// A rejected gateway event.
#[derive(Debug, Clone)]
pub struct GatewayError {
    pub class: ErrorClass,
    pub code: &'static str,
    pub message: String,
}

impl GatewayError {
    fn new(class: ErrorClass, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            class,
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Validation, code::VALIDATION_ERROR, message)
    }

    pub fn unknown_event(name: &str) -> Self {
        Self::new(
            ErrorClass::Validation,
            code::UNKNOWN_EVENT,
            format!("Unknown event: {name}"),
        )
    }

    pub fn room_not_found() -> Self {
        Self::new(ErrorClass::NotFound, code::ROOM_NOT_FOUND, "Room not found")
    }

    pub fn user_not_found() -> Self {
        Self::new(ErrorClass::NotFound, code::USER_NOT_FOUND, "User not found")
    }

    pub fn access_denied() -> Self {
        Self::new(
            ErrorClass::Authorization,
            code::ACCESS_DENIED,
            "You do not have access to this room",
        )
    }

    pub fn not_in_room() -> Self {
        Self::new(
            ErrorClass::Authorization,
            code::NOT_IN_ROOM,
            "Join the room before sending messages",
        )
    }

    pub fn not_a_member() -> Self {
        Self::new(
            ErrorClass::Authorization,
            code::NOT_A_MEMBER,
            "You are not a member of this community",
        )
    }

    pub fn not_moderator() -> Self {
        Self::new(
            ErrorClass::Authorization,
            code::NOT_MODERATOR,
            "Only moderators can post announcements",
        )
    }

    pub fn impersonation() -> Self {
        Self::new(
            ErrorClass::Authorization,
            code::IMPERSONATION,
            "Sender does not match the authenticated user",
        )
    }

    /// Generic upstream failure. Never carries internal details.
    pub fn internal() -> Self {
        Self::new(
            ErrorClass::Upstream,
            code::INTERNAL_ERROR,
            "An internal error occurred",
        )
    }

    pub fn is_impersonation(&self) -> bool {
        self.code == code::IMPERSONATION
    }

    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            message: self.message.clone(),
            code: self.code,
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for GatewayError {}

impl From<diesel::result::Error> for GatewayError {
    fn from(err: diesel::result::Error) -> Self {
        tracing::error!(?err, "database error");
        Self::internal()
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for GatewayError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        tracing::error!(?err, "pool error");
        Self::internal()
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!(?err, "notification webhook error");
        Self::internal()
    }
}
