//! Push/email notification hand-off. The gateway only reports events here;
//! delivery is the surrounding application's job.

pub mod webhook;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::error::GatewayError;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub data: Value,
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify_user(&self, user_id: i64, notification: Notification)
        -> Result<(), GatewayError>;

    async fn notify_community_members(
        &self,
        community_id: i64,
        notification: Notification,
        exclude_user_ids: Vec<i64>,
    ) -> Result<(), GatewayError>;
}

/// Logs notifications instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn notify_user(
        &self,
        user_id: i64,
        notification: Notification,
    ) -> Result<(), GatewayError> {
        tracing::info!(user_id, title = %notification.title, "notification (user)");
        Ok(())
    }

    async fn notify_community_members(
        &self,
        community_id: i64,
        notification: Notification,
        exclude_user_ids: Vec<i64>,
    ) -> Result<(), GatewayError> {
        tracing::info!(
            community_id,
            excluded = exclude_user_ids.len(),
            title = %notification.title,
            "notification (community)"
        );
        Ok(())
    }
}

/// A notification request captured by [`MemoryNotifier`].
#[derive(Debug, Clone, PartialEq)]
pub enum SentNotification {
    User {
        user_id: i64,
        notification: Notification,
    },
    Community {
        community_id: i64,
        notification: Notification,
        exclude_user_ids: Vec<i64>,
    },
}

/// Records every request. Optionally fails them all after recording.
#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<SentNotification>>,
    fail: bool,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentNotification> {
        self.sent.lock().clone()
    }

    fn record(&self, entry: SentNotification) -> Result<(), GatewayError> {
        self.sent.lock().push(entry);
        if self.fail {
            return Err(GatewayError::internal());
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for MemoryNotifier {
    async fn notify_user(
        &self,
        user_id: i64,
        notification: Notification,
    ) -> Result<(), GatewayError> {
        self.record(SentNotification::User {
            user_id,
            notification,
        })
    }

    async fn notify_community_members(
        &self,
        community_id: i64,
        notification: Notification,
        exclude_user_ids: Vec<i64>,
    ) -> Result<(), GatewayError> {
        self.record(SentNotification::Community {
            community_id,
            notification,
            exclude_user_ids,
        })
    }
}
