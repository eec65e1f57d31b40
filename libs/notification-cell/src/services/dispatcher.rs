use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::SchedulingStore;
use shared_models::scheduling::Notification;

use crate::error::NotificationError;
use crate::models::{NewNotification, NotificationEvent};
use crate::services::hub::NotificationHub;

/// Persists a notification row, then pushes it to the recipient's live
/// room. The row is the durable record; the push is best effort.
#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn SchedulingStore>,
    hub: NotificationHub,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn SchedulingStore>, hub: NotificationHub) -> Self {
        Self { store, hub }
    }

    pub async fn notify(&self, new: NewNotification) -> Result<Notification, NotificationError> {
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            notification_type: new.notification_type,
            title: new.title,
            message: new.message,
            read: false,
            meta: new.meta,
            created_at: Utc::now(),
        };

        let notification = self.store.insert_notification(notification).await?;

        match serde_json::to_string(&NotificationEvent::from(&notification)) {
            Ok(frame) => {
                let delivered = self.hub.publish(notification.user_id, frame).await;
                debug!(
                    "Notification {} pushed to {} socket(s) of user {}",
                    notification.id, delivered, notification.user_id
                );
            }
            Err(e) => warn!("Failed to encode notification {}: {}", notification.id, e),
        }

        Ok(notification)
    }

    /// For side effects of an already committed write: a failure is logged
    /// and never surfaces to the caller.
    pub async fn notify_after_commit(&self, new: NewNotification) -> Option<Notification> {
        let user_id = new.user_id;
        let notification_type = new.notification_type.clone();

        match self.notify(new).await {
            Ok(notification) => Some(notification),
            Err(e) => {
                warn!(
                    "Failed to record {} notification for user {}: {}",
                    notification_type, user_id, e
                );
                None
            }
        }
    }

    pub async fn list(&self, user_id: Uuid, unread_only: bool) -> Result<Vec<Notification>, NotificationError> {
        Ok(self.store.list_notifications(user_id, unread_only).await?)
    }

    /// Idempotent. Only the recipient may mark their notification.
    pub async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<Notification, NotificationError> {
        let notification = self.store.get_notification(id).await?;
        if notification.user_id != user_id {
            return Err(NotificationError::NotRecipient);
        }
        if notification.read {
            return Ok(notification);
        }

        let notification = self.store.mark_notification_read(id).await?;
        info!("Notification {} marked read", id);
        Ok(notification)
    }
}
