use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

pub type RoomSender = broadcast::Sender<String>;
pub type RoomReceiver = broadcast::Receiver<String>;

/// Per-user live rooms. A room exists while at least one socket of the
/// user is subscribed.
#[derive(Clone)]
pub struct NotificationHub {
    rooms: Arc<RwLock<HashMap<Uuid, RoomSender>>>,
    capacity: usize,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            rooms: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub async fn subscribe(&self, user_id: Uuid) -> RoomReceiver {
        let mut rooms = self.rooms.write().await;
        let sender = rooms
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0);

        debug!("User {} joined notification room", user_id);
        sender.subscribe()
    }

    /// Drops the room once its last subscriber is gone.
    pub async fn leave(&self, user_id: Uuid) {
        let mut rooms = self.rooms.write().await;
        if rooms.get(&user_id).map_or(false, |sender| sender.receiver_count() == 0) {
            rooms.remove(&user_id);
            debug!("Removed empty notification room for user {}", user_id);
        }
    }

    /// Pushes to the user's room. Returns how many sockets received it; an
    /// absent room is not an error.
    pub async fn publish(&self, user_id: Uuid, message: String) -> usize {
        let rooms = self.rooms.read().await;
        match rooms.get(&user_id) {
            Some(sender) => sender.send(message).unwrap_or_else(|_| {
                debug!("Notification room for user {} has no live receivers", user_id);
                0
            }),
            None => 0,
        }
    }

    pub async fn active_rooms(&self) -> Vec<Uuid> {
        let rooms = self.rooms.read().await;
        rooms.keys().cloned().collect()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_only_the_users_room() {
        let hub = NotificationHub::new(8);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut alice_rx = hub.subscribe(alice).await;
        let mut bob_rx = hub.subscribe(bob).await;

        assert_eq!(hub.publish(alice, "hello".to_string()).await, 1);
        assert_eq!(alice_rx.recv().await.unwrap(), "hello");
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_room_is_dropped() {
        let hub = NotificationHub::new(8);
        assert_eq!(hub.publish(Uuid::new_v4(), "lost".to_string()).await, 0);
    }

    #[tokio::test]
    async fn test_leave_removes_room_after_last_receiver() {
        let hub = NotificationHub::new(8);
        let user = Uuid::new_v4();

        let first = hub.subscribe(user).await;
        let second = hub.subscribe(user).await;

        drop(first);
        hub.leave(user).await;
        assert_eq!(hub.active_rooms().await, vec![user]);

        drop(second);
        hub.leave(user).await;
        assert!(hub.active_rooms().await.is_empty());
    }
}
