use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::SchedulingStore;
use shared_models::scheduling::Notification;

use crate::services::{NotificationDispatcher, NotificationHub};

#[derive(Clone)]
pub struct NotificationState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn SchedulingStore>,
    pub hub: NotificationHub,
}

impl NotificationState {
    pub fn dispatcher(&self) -> NotificationDispatcher {
        NotificationDispatcher::new(self.store.clone(), self.hub.clone())
    }
}

/// A notification about to be persisted and pushed.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub meta: Value,
}

impl NewNotification {
    pub fn new(
        user_id: Uuid,
        notification_type: impl Into<String>,
        title: impl Into<String>,
        message: impl Into<String>,
        meta: Value,
    ) -> Self {
        Self {
            user_id,
            notification_type: notification_type.into(),
            title: title.into(),
            message: message.into(),
            meta,
        }
    }
}

/// Live-channel frame: `{"event": "notification", "data": {...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationEvent {
    pub event: String,
    pub data: NotificationPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationPayload {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub meta: Value,
    #[serde(rename = "type")]
    pub notification_type: String,
}

impl From<&Notification> for NotificationEvent {
    fn from(notification: &Notification) -> Self {
        Self {
            event: "notification".to_string(),
            data: NotificationPayload {
                id: notification.id,
                title: notification.title.clone(),
                message: notification.message.clone(),
                meta: notification.meta.clone(),
                notification_type: notification.notification_type.clone(),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Deserialize)]
pub struct WsAuthQuery {
    pub token: String,
}
