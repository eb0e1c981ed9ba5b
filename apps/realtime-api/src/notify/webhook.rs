use async_trait::async_trait;
use serde::Serialize;

use super::{Notification, NotificationDispatcher};
use crate::error::GatewayError;

/// Forwards notification requests as JSON POSTs to the application's
/// notification service.
pub struct WebhookNotifier {
    url: String,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
enum WebhookBody<'a> {
    #[serde(rename_all = "camelCase")]
    User {
        user_id: i64,
        notification: &'a Notification,
    },
    #[serde(rename_all = "camelCase")]
    Community {
        community_id: i64,
        exclude_user_ids: &'a [i64],
        notification: &'a Notification,
    },
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            http: reqwest::Client::new(),
        }
    }

    async fn post(&self, body: &WebhookBody<'_>) -> Result<(), GatewayError> {
        self.http
            .post(&self.url)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookNotifier {
    async fn notify_user(
        &self,
        user_id: i64,
        notification: Notification,
    ) -> Result<(), GatewayError> {
        self.post(&WebhookBody::User {
            user_id,
            notification: &notification,
        })
        .await
    }

    async fn notify_community_members(
        &self,
        community_id: i64,
        notification: Notification,
        exclude_user_ids: Vec<i64>,
    ) -> Result<(), GatewayError> {
        self.post(&WebhookBody::Community {
            community_id,
            exclude_user_ids: &exclude_user_ids,
            notification: &notification,
        })
        .await
    }
}
