use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_models::scheduling::{
    Appointment, AppointmentStatus, AvailabilityRule, AvailabilitySnapshot, DayOff, Notification,
    QueueStatus, WaitingQueueEntry,
};

use crate::store::{
    AppointmentFilter, BookingGuard, QueueFilter, SchedulingStore, StoreError, StoreResult,
};

#[derive(Default)]
struct Tables {
    rules: HashMap<Uuid, AvailabilityRule>,
    days_off: HashMap<Uuid, DayOff>,
    revisions: HashMap<Uuid, i64>,
    appointments: HashMap<Uuid, Appointment>,
    queue: HashMap<Uuid, WaitingQueueEntry>,
    notifications: HashMap<Uuid, Notification>,
}

impl Tables {
    fn revision(&self, doctor_id: Uuid) -> i64 {
        self.revisions.get(&doctor_id).copied().unwrap_or(0)
    }

    fn bump_revision(&mut self, doctor_id: Uuid) {
        *self.revisions.entry(doctor_id).or_insert(0) += 1;
    }

    fn check_booking(&self, appointment: &Appointment, guard: &BookingGuard) -> StoreResult<()> {
        if self.revision(appointment.doctor_id) != guard.schedule_revision {
            return Err(StoreError::StaleSnapshot);
        }

        let taken = self.appointments.values().any(|other| {
            other.id != appointment.id
                && other.doctor_id == appointment.doctor_id
                && other.status.occupies_slot()
                && guard.overlaps(other.appointment_date, appointment.appointment_date)
        });

        if taken {
            return Err(StoreError::Conflict("slot_taken".to_string()));
        }

        Ok(())
    }
}

/// Process-local store. Every call holds the single write lock for its whole
/// read-check-write, which makes each trait call atomic.
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(kind: &str, id: Uuid) -> StoreError {
    StoreError::NotFound(format!("{} {}", kind, id))
}

#[async_trait]
impl SchedulingStore for InMemoryStore {
    async fn list_rules(&self, doctor_id: Uuid) -> StoreResult<Vec<AvailabilityRule>> {
        let tables = self.tables.read().await;
        let mut rules: Vec<AvailabilityRule> = tables
            .rules
            .values()
            .filter(|r| r.doctor_id == doctor_id)
            .cloned()
            .collect();
        rules.sort_by_key(|r| (r.effective_from, r.created_at));
        Ok(rules)
    }

    async fn get_rule(&self, rule_id: Uuid) -> StoreResult<AvailabilityRule> {
        let tables = self.tables.read().await;
        tables
            .rules
            .get(&rule_id)
            .cloned()
            .ok_or_else(|| not_found("availability rule", rule_id))
    }

    async fn insert_rule(&self, rule: AvailabilityRule) -> StoreResult<AvailabilityRule> {
        let mut tables = self.tables.write().await;
        tables.bump_revision(rule.doctor_id);
        tables.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn update_rule(&self, rule: AvailabilityRule) -> StoreResult<AvailabilityRule> {
        let mut tables = self.tables.write().await;
        if !tables.rules.contains_key(&rule.id) {
            return Err(not_found("availability rule", rule.id));
        }
        tables.bump_revision(rule.doctor_id);
        tables.rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn delete_rule(&self, rule_id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let rule = tables
            .rules
            .remove(&rule_id)
            .ok_or_else(|| not_found("availability rule", rule_id))?;
        tables.bump_revision(rule.doctor_id);
        Ok(())
    }

    async fn list_days_off(&self, doctor_id: Uuid) -> StoreResult<Vec<DayOff>> {
        let tables = self.tables.read().await;
        let mut days_off: Vec<DayOff> = tables
            .days_off
            .values()
            .filter(|d| d.doctor_id == doctor_id)
            .cloned()
            .collect();
        days_off.sort_by_key(|d| d.start_date);
        Ok(days_off)
    }

    async fn get_day_off(&self, day_off_id: Uuid) -> StoreResult<DayOff> {
        let tables = self.tables.read().await;
        tables
            .days_off
            .get(&day_off_id)
            .cloned()
            .ok_or_else(|| not_found("day off", day_off_id))
    }

    async fn insert_day_off(&self, day_off: DayOff) -> StoreResult<DayOff> {
        let mut tables = self.tables.write().await;
        tables.bump_revision(day_off.doctor_id);
        tables.days_off.insert(day_off.id, day_off.clone());
        Ok(day_off)
    }

    async fn delete_day_off(&self, day_off_id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let day_off = tables
            .days_off
            .remove(&day_off_id)
            .ok_or_else(|| not_found("day off", day_off_id))?;
        tables.bump_revision(day_off.doctor_id);
        Ok(())
    }

    async fn availability_snapshot(&self, doctor_id: Uuid) -> StoreResult<AvailabilitySnapshot> {
        let tables = self.tables.read().await;
        Ok(AvailabilitySnapshot {
            doctor_id,
            revision: tables.revision(doctor_id),
            rules: tables
                .rules
                .values()
                .filter(|r| r.doctor_id == doctor_id)
                .cloned()
                .collect(),
            days_off: tables
                .days_off
                .values()
                .filter(|d| d.doctor_id == doctor_id)
                .cloned()
                .collect(),
        })
    }

    async fn get_appointment(&self, id: Uuid) -> StoreResult<Appointment> {
        let tables = self.tables.read().await;
        tables
            .appointments
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("appointment", id))
    }

    async fn list_appointments(&self, filter: &AppointmentFilter) -> StoreResult<Vec<Appointment>> {
        let tables = self.tables.read().await;
        let mut appointments: Vec<Appointment> = tables
            .appointments
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        appointments.sort_by_key(|a| a.appointment_date);
        Ok(appointments)
    }

    async fn insert_appointment(
        &self,
        appointment: Appointment,
        guard: BookingGuard,
    ) -> StoreResult<Appointment> {
        let mut tables = self.tables.write().await;
        tables.check_booking(&appointment, &guard)?;
        tables.appointments.insert(appointment.id, appointment.clone());
        debug!("Stored appointment {}", appointment.id);
        Ok(appointment)
    }

    async fn update_appointment(
        &self,
        mut appointment: Appointment,
        expected_status: AppointmentStatus,
        guard: Option<BookingGuard>,
    ) -> StoreResult<Appointment> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .appointments
            .get(&appointment.id)
            .ok_or_else(|| not_found("appointment", appointment.id))?;

        if stored.status.is_terminal() && stored.status != expected_status {
            return Err(StoreError::Conflict("terminal_state".to_string()));
        }
        if stored.status != expected_status || stored.version != appointment.version {
            debug!(
                "Appointment {} moved to version {} ({}), write from version {} rejected",
                appointment.id, stored.version, stored.status, appointment.version
            );
            return Err(StoreError::Conflict("status_changed".to_string()));
        }

        if let Some(guard) = guard {
            tables.check_booking(&appointment, &guard)?;
        }

        appointment.version += 1;
        tables.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn get_queue_entry(&self, id: Uuid) -> StoreResult<WaitingQueueEntry> {
        let tables = self.tables.read().await;
        tables
            .queue
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("queue entry", id))
    }

    async fn list_queue_entries(&self, filter: &QueueFilter) -> StoreResult<Vec<WaitingQueueEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .queue
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }

    async fn insert_queue_entry(&self, entry: WaitingQueueEntry) -> StoreResult<WaitingQueueEntry> {
        let mut tables = self.tables.write().await;
        tables.queue.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn update_queue_entry(
        &self,
        mut entry: WaitingQueueEntry,
        expected_status: QueueStatus,
    ) -> StoreResult<WaitingQueueEntry> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .queue
            .get(&entry.id)
            .ok_or_else(|| not_found("queue entry", entry.id))?;

        if stored.status != expected_status {
            return Err(StoreError::Conflict("entry_not_waiting".to_string()));
        }
        if stored.version != entry.version {
            return Err(StoreError::Conflict("entry_changed".to_string()));
        }

        entry.version += 1;
        tables.queue.insert(entry.id, entry.clone());
        Ok(entry)
    }

    async fn promote_queue_entry(
        &self,
        entry_id: Uuid,
        appointment: Appointment,
        guard: BookingGuard,
    ) -> StoreResult<(WaitingQueueEntry, Appointment)> {
        let mut tables = self.tables.write().await;
        let mut entry = tables
            .queue
            .get(&entry_id)
            .cloned()
            .ok_or_else(|| not_found("queue entry", entry_id))?;

        if entry.status != QueueStatus::Waiting {
            return Err(StoreError::Conflict("entry_not_waiting".to_string()));
        }

        tables.check_booking(&appointment, &guard)?;

        entry.status = QueueStatus::Scheduled;
        entry.scheduled_appointment_id = Some(appointment.id);
        entry.updated_at = appointment.created_at;
        entry.version += 1;

        tables.appointments.insert(appointment.id, appointment.clone());
        tables.queue.insert(entry.id, entry.clone());

        Ok((entry, appointment))
    }

    async fn expire_queue_entries(
        &self,
        created_before: DateTime<Utc>,
    ) -> StoreResult<Vec<WaitingQueueEntry>> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let mut expired = Vec::new();

        for entry in tables.queue.values_mut() {
            if entry.status == QueueStatus::Waiting && entry.created_at < created_before {
                entry.status = QueueStatus::Expired;
                entry.updated_at = now;
                entry.version += 1;
                expired.push(entry.clone());
            }
        }

        Ok(expired)
    }

    async fn insert_notification(&self, notification: Notification) -> StoreResult<Notification> {
        let mut tables = self.tables.write().await;
        tables.notifications.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn get_notification(&self, id: Uuid) -> StoreResult<Notification> {
        let tables = self.tables.read().await;
        tables
            .notifications
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("notification", id))
    }

    async fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> StoreResult<Vec<Notification>> {
        let tables = self.tables.read().await;
        let mut notifications: Vec<Notification> = tables
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.read))
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    async fn mark_notification_read(&self, id: Uuid) -> StoreResult<Notification> {
        let mut tables = self.tables.write().await;
        let notification = tables
            .notifications
            .get_mut(&id)
            .ok_or_else(|| not_found("notification", id))?;
        notification.read = true;
        Ok(notification.clone())
    }
}
