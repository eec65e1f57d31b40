// libs/waiting-queue-cell/src/services/queue.rs
use std::cmp::Reverse;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use appointment_cell::AppointmentBookingService;
use notification_cell::{NewNotification, NotificationDispatcher};
use shared_database::{QueueFilter, SchedulingStore, StoreError};
use shared_models::scheduling::{
    Appointment, AuditAction, QueuePriority, QueueStatus, WaitingQueueEntry,
};

use crate::error::WaitingQueueError;
use crate::models::CreateQueueEntryRequest;

/// Staff triage order: highest priority first, first come first served
/// within a priority.
pub fn triage_order(entries: &mut [WaitingQueueEntry]) {
    entries.sort_by_key(|entry| (Reverse(entry.priority.rank()), entry.created_at));
}

pub struct WaitingQueueService {
    store: Arc<dyn SchedulingStore>,
    booking: AppointmentBookingService,
    dispatcher: NotificationDispatcher,
    ttl: Duration,
}

impl WaitingQueueService {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        booking: AppointmentBookingService,
        dispatcher: NotificationDispatcher,
        ttl_hours: i64,
    ) -> Self {
        Self {
            store,
            booking,
            dispatcher,
            ttl: Duration::hours(ttl_hours.max(1)),
        }
    }

    fn is_stale(&self, entry: &WaitingQueueEntry, now: DateTime<Utc>) -> bool {
        entry.created_at < now - self.ttl
    }

    pub async fn create(&self, request: CreateQueueEntryRequest) -> Result<WaitingQueueEntry, WaitingQueueError> {
        debug!(
            "Adding patient {} to the waiting queue of doctor {}",
            request.patient_id, request.doctor_id
        );

        let now = Utc::now();
        let entry = WaitingQueueEntry {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            priority: request.priority,
            status: QueueStatus::Waiting,
            requested_date: request.requested_date,
            notes: request.notes,
            scheduled_appointment_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };

        let entry = self.store.insert_queue_entry(entry).await?;
        info!("Queue entry {} created with priority {:?}", entry.id, entry.priority);
        Ok(entry)
    }

    pub async fn get(&self, entry_id: Uuid) -> Result<WaitingQueueEntry, WaitingQueueError> {
        Ok(self.store.get_queue_entry(entry_id).await?)
    }

    /// Expires stale entries, then returns the matching ones in triage order.
    pub async fn list(
        &self,
        filter: QueueFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<WaitingQueueEntry>, WaitingQueueError> {
        self.expire_stale(now).await?;

        let mut entries = self.store.list_queue_entries(&filter).await?;
        triage_order(&mut entries);
        Ok(entries)
    }

    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<Vec<WaitingQueueEntry>, WaitingQueueError> {
        let expired = self.store.expire_queue_entries(now - self.ttl).await?;
        if !expired.is_empty() {
            info!("Expired {} stale waiting queue entries", expired.len());
        }
        Ok(expired)
    }

    pub async fn reprioritize(
        &self,
        entry_id: Uuid,
        priority: QueuePriority,
    ) -> Result<WaitingQueueEntry, WaitingQueueError> {
        let mut entry = self.waiting_entry(entry_id).await?;

        entry.priority = priority;
        entry.updated_at = Utc::now();

        let entry = self.store.update_queue_entry(entry, QueueStatus::Waiting).await?;
        info!("Queue entry {} reprioritized to {:?}", entry.id, priority);
        Ok(entry)
    }

    /// Withdraws a waiting entry. Appointments are never touched.
    pub async fn remove(&self, entry_id: Uuid) -> Result<WaitingQueueEntry, WaitingQueueError> {
        let mut entry = self.waiting_entry(entry_id).await?;

        entry.status = QueueStatus::Canceled;
        entry.updated_at = Utc::now();

        let entry = self.store.update_queue_entry(entry, QueueStatus::Waiting).await?;
        info!("Queue entry {} removed", entry.id);
        Ok(entry)
    }

    /// Books the entry's patient at `when` and marks the entry scheduled in
    /// one store call. Any rejection leaves the entry waiting.
    pub async fn promote(
        &self,
        entry_id: Uuid,
        when: DateTime<Utc>,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(WaitingQueueEntry, Appointment), WaitingQueueError> {
        debug!("Promoting queue entry {} to an appointment at {}", entry_id, when);

        let entry = self.waiting_entry(entry_id).await?;

        if self.is_stale(&entry, now) {
            self.expire_entry(entry).await;
            return Err(WaitingQueueError::EntryExpired);
        }

        let guard = self.booking.validate_booking(entry.doctor_id, when, now).await?;
        let appointment = AppointmentBookingService::new_appointment(
            entry.patient_id,
            entry.doctor_id,
            when,
            notes.or_else(|| entry.notes.clone()),
            AuditAction::Promoted,
            None,
            now,
        );

        let (entry, appointment) = self
            .store
            .promote_queue_entry(entry_id, appointment, guard)
            .await?;
        info!("Queue entry {} promoted to appointment {}", entry.id, appointment.id);

        self.dispatcher
            .notify_after_commit(NewNotification::new(
                appointment.patient_id,
                "queue_promoted",
                "Appointment scheduled",
                format!("You have been scheduled from the waiting list for {}", appointment.appointment_date),
                json!({
                    "appointment_id": appointment.id,
                    "queue_entry_id": entry.id,
                    "doctor_id": appointment.doctor_id,
                    "appointment_date": appointment.appointment_date,
                }),
            ))
            .await;

        Ok((entry, appointment))
    }

    async fn waiting_entry(&self, entry_id: Uuid) -> Result<WaitingQueueEntry, WaitingQueueError> {
        let entry = self.get(entry_id).await?;
        if entry.status != QueueStatus::Waiting {
            warn!("Queue entry {} is {}, not waiting", entry.id, entry.status);
            return Err(WaitingQueueError::EntryNotWaiting);
        }
        Ok(entry)
    }

    async fn expire_entry(&self, mut entry: WaitingQueueEntry) {
        let entry_id = entry.id;
        entry.status = QueueStatus::Expired;
        entry.updated_at = Utc::now();

        match self.store.update_queue_entry(entry, QueueStatus::Waiting).await {
            Ok(_) => info!("Queue entry {} expired on promotion", entry_id),
            Err(StoreError::Conflict(_)) => debug!("Queue entry {} left waiting concurrently", entry_id),
            Err(e) => warn!("Failed to expire queue entry {}: {}", entry_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(priority: QueuePriority, minute: u32) -> WaitingQueueEntry {
        let created_at = Utc.with_ymd_and_hms(2030, 1, 1, 9, minute, 0).unwrap();
        WaitingQueueEntry {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            doctor_id: Uuid::nil(),
            priority,
            status: QueueStatus::Waiting,
            requested_date: None,
            notes: None,
            scheduled_appointment_id: None,
            version: 0,
            created_at,
            updated_at: created_at,
        }
    }

    #[test]
    fn test_triage_order() {
        let a = entry(QueuePriority::Medium, 0);
        let b = entry(QueuePriority::Urgent, 5);
        let c = entry(QueuePriority::Medium, 10);
        let d = entry(QueuePriority::Urgent, 15);
        let mut entries = vec![a.clone(), b.clone(), c.clone(), d.clone()];

        triage_order(&mut entries);

        let ids: Vec<Uuid> = entries.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![b.id, d.id, a.id, c.id]);
    }

    #[test]
    fn test_reprioritized_entry_moves_immediately() {
        let a = entry(QueuePriority::Low, 0);
        let mut b = entry(QueuePriority::Low, 5);
        b.priority = QueuePriority::High;
        let mut entries = vec![a.clone(), b.clone()];

        triage_order(&mut entries);
        assert_eq!(entries[0].id, b.id);
    }
}
