use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use shared_models::scheduling::{
    Appointment, AppointmentStatus, AvailabilityRule, AvailabilitySnapshot, DayOff, Notification,
    QueueStatus, WaitingQueueEntry,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// Carries the reason code raised by the storage layer.
    #[error("write rejected: {0}")]
    Conflict(String),

    #[error("doctor schedule changed since it was evaluated")]
    StaleSnapshot,

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Write-time recheck for any operation that places an appointment on a
/// doctor's calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingGuard {
    /// Revision of the availability snapshot the engine evaluated.
    pub schedule_revision: i64,
    pub slot_minutes: i64,
}

impl BookingGuard {
    pub fn new(schedule_revision: i64, slot_minutes: i64) -> Self {
        Self {
            schedule_revision,
            slot_minutes: slot_minutes.max(1),
        }
    }

    /// True when two appointment starts fall within one slot of each other.
    pub fn overlaps(&self, a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
        let gap = if a > b { a - b } else { b - a };
        gap < Duration::minutes(self.slot_minutes)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentFilter {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AppointmentFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.patient_id.map_or(true, |id| appointment.patient_id == id)
            && self.doctor_id.map_or(true, |id| appointment.doctor_id == id)
            && self.status.map_or(true, |s| appointment.status == s)
            && self.from.map_or(true, |from| appointment.appointment_date >= from)
            && self.to.map_or(true, |to| appointment.appointment_date < to)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueFilter {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub status: Option<QueueStatus>,
}

impl QueueFilter {
    pub fn matches(&self, entry: &WaitingQueueEntry) -> bool {
        self.doctor_id.map_or(true, |id| entry.doctor_id == id)
            && self.patient_id.map_or(true, |id| entry.patient_id == id)
            && self.status.map_or(true, |s| entry.status == s)
    }
}

/// Persistence seam for every scheduling entity.
///
/// Each method is one unit of work: the backends make every call atomic,
/// so operations that must commit together (promotion, guarded booking,
/// compare-and-set status writes) are single calls here.
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    // Availability rules and days off. Every write bumps the doctor's
    // schedule revision.
    async fn list_rules(&self, doctor_id: Uuid) -> StoreResult<Vec<AvailabilityRule>>;
    async fn get_rule(&self, rule_id: Uuid) -> StoreResult<AvailabilityRule>;
    async fn insert_rule(&self, rule: AvailabilityRule) -> StoreResult<AvailabilityRule>;
    async fn update_rule(&self, rule: AvailabilityRule) -> StoreResult<AvailabilityRule>;
    async fn delete_rule(&self, rule_id: Uuid) -> StoreResult<()>;

    async fn list_days_off(&self, doctor_id: Uuid) -> StoreResult<Vec<DayOff>>;
    async fn get_day_off(&self, day_off_id: Uuid) -> StoreResult<DayOff>;
    async fn insert_day_off(&self, day_off: DayOff) -> StoreResult<DayOff>;
    async fn delete_day_off(&self, day_off_id: Uuid) -> StoreResult<()>;

    /// Rules and days off of one doctor, read together with their revision.
    async fn availability_snapshot(&self, doctor_id: Uuid) -> StoreResult<AvailabilitySnapshot>;

    // Appointments
    async fn get_appointment(&self, id: Uuid) -> StoreResult<Appointment>;
    async fn list_appointments(&self, filter: &AppointmentFilter) -> StoreResult<Vec<Appointment>>;

    /// Fails with `StaleSnapshot` when the doctor's schedule revision moved
    /// and with `Conflict("slot_taken")` when another active appointment of
    /// the doctor overlaps the slot.
    async fn insert_appointment(
        &self,
        appointment: Appointment,
        guard: BookingGuard,
    ) -> StoreResult<Appointment>;

    /// Compare-and-set on the stored status and row version. A stored
    /// terminal status fails with `Conflict("terminal_state")`, any other
    /// mismatch with `Conflict("status_changed")`. With a guard the same
    /// checks as `insert_appointment` apply to the new date. The returned
    /// row carries the next version.
    async fn update_appointment(
        &self,
        appointment: Appointment,
        expected_status: AppointmentStatus,
        guard: Option<BookingGuard>,
    ) -> StoreResult<Appointment>;

    // Waiting queue
    async fn get_queue_entry(&self, id: Uuid) -> StoreResult<WaitingQueueEntry>;
    async fn list_queue_entries(&self, filter: &QueueFilter) -> StoreResult<Vec<WaitingQueueEntry>>;
    async fn insert_queue_entry(&self, entry: WaitingQueueEntry) -> StoreResult<WaitingQueueEntry>;

    /// Compare-and-set on the stored status, `Conflict("entry_not_waiting")`
    /// on mismatch, then on the row version, `Conflict("entry_changed")`.
    async fn update_queue_entry(
        &self,
        entry: WaitingQueueEntry,
        expected_status: QueueStatus,
    ) -> StoreResult<WaitingQueueEntry>;

    /// Inserts the appointment and moves the entry from waiting to
    /// scheduled in one unit. Nothing is written on any failure.
    async fn promote_queue_entry(
        &self,
        entry_id: Uuid,
        appointment: Appointment,
        guard: BookingGuard,
    ) -> StoreResult<(WaitingQueueEntry, Appointment)>;

    /// Moves every waiting entry created before the cutoff to expired.
    async fn expire_queue_entries(
        &self,
        created_before: DateTime<Utc>,
    ) -> StoreResult<Vec<WaitingQueueEntry>>;

    // Notifications
    async fn insert_notification(&self, notification: Notification) -> StoreResult<Notification>;
    async fn get_notification(&self, id: Uuid) -> StoreResult<Notification>;
    async fn list_notifications(&self, user_id: Uuid, unread_only: bool) -> StoreResult<Vec<Notification>>;
    async fn mark_notification_read(&self, id: Uuid) -> StoreResult<Notification>;
}
