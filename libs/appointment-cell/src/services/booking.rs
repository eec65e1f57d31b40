// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use doctor_cell::{AvailabilityService, Decision};
use notification_cell::{NewNotification, NotificationDispatcher};
use shared_database::{AppointmentFilter, BookingGuard, SchedulingStore};
use shared_models::scheduling::{Appointment, AppointmentStatus, AuditAction, AuditEntry};

use crate::error::AppointmentError;
use crate::models::{CreateAppointmentRequest, Invoice};
use crate::services::billing::BillingClient;
use crate::services::lifecycle::AppointmentLifecycleService;

fn audit(
    at: DateTime<Utc>,
    action: AuditAction,
    reason: Option<String>,
    from_status: Option<AppointmentStatus>,
    to_status: Option<AppointmentStatus>,
) -> AuditEntry {
    AuditEntry {
        at,
        action,
        reason,
        from_status,
        to_status,
        previous_date: None,
    }
}

fn appointment_meta(appointment: &Appointment) -> Value {
    json!({
        "appointment_id": appointment.id,
        "doctor_id": appointment.doctor_id,
        "patient_id": appointment.patient_id,
        "appointment_date": appointment.appointment_date,
        "status": appointment.status,
    })
}

pub struct AppointmentBookingService {
    store: Arc<dyn SchedulingStore>,
    availability: AvailabilityService,
    dispatcher: NotificationDispatcher,
    billing: Arc<dyn BillingClient>,
    lifecycle: AppointmentLifecycleService,
}

impl AppointmentBookingService {
    pub fn new(
        store: Arc<dyn SchedulingStore>,
        availability: AvailabilityService,
        dispatcher: NotificationDispatcher,
        billing: Arc<dyn BillingClient>,
    ) -> Self {
        Self {
            store,
            availability,
            dispatcher,
            billing,
            lifecycle: AppointmentLifecycleService::new(),
        }
    }

    /// A fresh pending appointment carrying its first audit entry. Nothing is
    /// written until it goes through a guarded insert.
    pub fn new_appointment(
        patient_id: Uuid,
        doctor_id: Uuid,
        when: DateTime<Utc>,
        notes: Option<String>,
        action: AuditAction,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Appointment {
        let mut appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id,
            appointment_date: when,
            status: AppointmentStatus::Pending,
            notes,
            is_follow_up: false,
            parent_appointment_id: None,
            confirmation_sent_at: None,
            confirmed_by_patient: false,
            audit_trail: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        };
        appointment.record(audit(now, action, reason, None, Some(AppointmentStatus::Pending)));
        appointment
    }

    /// Authoritative booking check: `when` must be in the future and allowed
    /// by the doctor's schedule. The returned guard pins the schedule
    /// revision the decision was made against.
    pub async fn validate_booking(
        &self,
        doctor_id: Uuid,
        when: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<BookingGuard, AppointmentError> {
        if when <= now {
            warn!("Rejected booking for doctor {} in the past: {}", doctor_id, when);
            return Err(AppointmentError::PastDate);
        }

        let (decision, guard) = self.availability.check(doctor_id, when).await?;
        if let Decision::Deny(reason) = decision {
            warn!("Doctor {} unavailable at {}: {}", doctor_id, when, reason);
            return Err(AppointmentError::Unavailable(reason));
        }

        Ok(guard)
    }

    // ==========================================================================
    // CREATE / READ
    // ==========================================================================

    pub async fn create(
        &self,
        request: CreateAppointmentRequest,
        booked_by: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        debug!(
            "Booking appointment for patient {} with doctor {} at {}",
            request.patient_id, request.doctor_id, request.appointment_date
        );

        let now = Utc::now();
        let guard = self
            .validate_booking(request.doctor_id, request.appointment_date, now)
            .await?;

        let appointment = Self::new_appointment(
            request.patient_id,
            request.doctor_id,
            request.appointment_date,
            request.notes,
            AuditAction::Created,
            None,
            now,
        );

        let appointment = self.store.insert_appointment(appointment, guard).await?;
        info!(
            "Appointment {} booked for patient {} with doctor {}",
            appointment.id, appointment.patient_id, appointment.doctor_id
        );

        self.notify(
            appointment.doctor_id,
            "appointment_booked",
            "New appointment",
            format!("A new appointment was booked for {}", appointment.appointment_date),
            &appointment,
        )
        .await;

        if booked_by != appointment.patient_id {
            self.notify(
                appointment.patient_id,
                "appointment_created",
                "Appointment booked",
                format!("An appointment was booked for you on {}", appointment.appointment_date),
                &appointment,
            )
            .await;
        }

        Ok(appointment)
    }

    pub async fn get(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        Ok(self.store.get_appointment(appointment_id).await?)
    }

    pub async fn list(&self, filter: AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError> {
        debug!("Listing appointments with filter {:?}", filter);
        Ok(self.store.list_appointments(&filter).await?)
    }

    // ==========================================================================
    // TRANSITIONS
    // ==========================================================================

    pub async fn set_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Setting appointment {} status to {}", appointment_id, new_status);

        let mut appointment = self.get(appointment_id).await?;
        let current = appointment.status;
        self.lifecycle.validate_status_transition(current, new_status)?;

        appointment.status = new_status;
        appointment.record(audit(
            Utc::now(),
            AuditAction::StatusChanged,
            reason,
            Some(current),
            Some(new_status),
        ));

        let appointment = self.store.update_appointment(appointment, current, None).await?;
        info!("Appointment {} moved {} -> {}", appointment.id, current, new_status);

        self.notify(
            appointment.patient_id,
            "appointment_status_changed",
            "Appointment updated",
            format!("Your appointment is now {}", new_status),
            &appointment,
        )
        .await;

        Ok(appointment)
    }

    /// Moves the appointment in place: the row passes through the
    /// rescheduled marker and lands back in pending with the new date.
    pub async fn reschedule(
        &self,
        appointment_id: Uuid,
        new_date: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Rescheduling appointment {} to {}", appointment_id, new_date);

        let mut appointment = self.get(appointment_id).await?;
        let current = appointment.status;
        self.lifecycle.validate_reschedulable(current)?;

        let now = Utc::now();
        let guard = self
            .validate_booking(appointment.doctor_id, new_date, now)
            .await?;

        if current != AppointmentStatus::Rescheduled {
            appointment.record(audit(
                now,
                AuditAction::StatusChanged,
                None,
                Some(current),
                Some(AppointmentStatus::Rescheduled),
            ));
        }
        appointment.record(AuditEntry {
            previous_date: Some(appointment.appointment_date),
            ..audit(
                now,
                AuditAction::Rescheduled,
                reason,
                Some(AppointmentStatus::Rescheduled),
                Some(AppointmentStatus::Pending),
            )
        });

        appointment.appointment_date = new_date;
        appointment.status = AppointmentStatus::Pending;
        appointment.confirmed_by_patient = false;
        appointment.confirmation_sent_at = None;

        let appointment = self
            .store
            .update_appointment(appointment, current, Some(guard))
            .await?;
        info!("Appointment {} rescheduled to {}", appointment.id, appointment.appointment_date);

        self.notify(
            appointment.patient_id,
            "appointment_rescheduled",
            "Appointment rescheduled",
            format!("Your appointment was moved to {}", appointment.appointment_date),
            &appointment,
        )
        .await;
        self.notify(
            appointment.doctor_id,
            "appointment_rescheduled",
            "Appointment rescheduled",
            format!("An appointment was moved to {}", appointment.appointment_date),
            &appointment,
        )
        .await;

        Ok(appointment)
    }

    /// Books a new appointment linked to a completed parent. The parent row
    /// is never written.
    pub async fn schedule_follow_up(
        &self,
        parent_id: Uuid,
        when: DateTime<Utc>,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Scheduling follow-up of appointment {} at {}", parent_id, when);

        let parent = self.get(parent_id).await?;
        if parent.status != AppointmentStatus::Completed {
            warn!("Follow-up rejected, appointment {} is {}", parent.id, parent.status);
            return Err(AppointmentError::FollowUpRequiresCompleted(parent.status));
        }

        let now = Utc::now();
        let guard = self.validate_booking(parent.doctor_id, when, now).await?;

        let mut follow_up = Self::new_appointment(
            parent.patient_id,
            parent.doctor_id,
            when,
            reason.clone(),
            AuditAction::FollowUpScheduled,
            reason,
            now,
        );
        follow_up.is_follow_up = true;
        follow_up.parent_appointment_id = Some(parent.id);

        let follow_up = self.store.insert_appointment(follow_up, guard).await?;
        info!("Follow-up {} scheduled for appointment {}", follow_up.id, parent.id);

        self.notify(
            follow_up.patient_id,
            "follow_up_scheduled",
            "Follow-up scheduled",
            format!("A follow-up appointment was scheduled for {}", follow_up.appointment_date),
            &follow_up,
        )
        .await;

        Ok(follow_up)
    }

    // ==========================================================================
    // CONFIRMATION FLOW
    // ==========================================================================

    /// Patient acknowledgement. Leaves the status alone and is idempotent.
    pub async fn confirm_by_patient(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let mut appointment = self.get(appointment_id).await?;
        let current = appointment.status;
        self.lifecycle.validate_awaiting_visit(current)?;

        if appointment.confirmed_by_patient {
            return Ok(appointment);
        }

        appointment.confirmed_by_patient = true;
        appointment.record(audit(
            Utc::now(),
            AuditAction::PatientConfirmed,
            None,
            Some(current),
            Some(current),
        ));

        let appointment = self.store.update_appointment(appointment, current, None).await?;
        info!("Patient confirmed appointment {}", appointment.id);
        Ok(appointment)
    }

    pub async fn send_confirmation(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let mut appointment = self.get(appointment_id).await?;
        let current = appointment.status;
        self.lifecycle.validate_awaiting_visit(current)?;

        let now = Utc::now();
        appointment.confirmation_sent_at = Some(now);
        appointment.record(audit(
            now,
            AuditAction::ConfirmationSent,
            None,
            Some(current),
            Some(current),
        ));

        let appointment = self.store.update_appointment(appointment, current, None).await?;
        info!("Confirmation request sent for appointment {}", appointment.id);

        self.notify(
            appointment.patient_id,
            "appointment_confirmation",
            "Please confirm your appointment",
            format!("Please confirm your appointment on {}", appointment.appointment_date),
            &appointment,
        )
        .await;

        Ok(appointment)
    }

    // ==========================================================================
    // BILLING
    // ==========================================================================

    /// Never writes the appointment, so a billing failure leaves it as is.
    pub async fn generate_bill(&self, appointment_id: Uuid) -> Result<Invoice, AppointmentError> {
        let appointment = self.get(appointment_id).await?;
        if appointment.status == AppointmentStatus::Canceled {
            warn!("Refusing to bill canceled appointment {}", appointment.id);
            return Err(AppointmentError::NotBillable);
        }

        let invoice = self.billing.generate_bill(&appointment).await.map_err(|e| {
            warn!("Billing failed for appointment {}: {}", appointment.id, e);
            AppointmentError::BillingFailed(e)
        })?;

        info!("Appointment {} billed with invoice {}", appointment.id, invoice.id);
        Ok(invoice)
    }

    async fn notify(
        &self,
        user_id: Uuid,
        notification_type: &str,
        title: &str,
        message: String,
        appointment: &Appointment,
    ) {
        self.dispatcher
            .notify_after_commit(NewNotification::new(
                user_id,
                notification_type,
                title,
                message,
                appointment_meta(appointment),
            ))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::billing::{BillingError, MockBillingClient};
    use assert_matches::assert_matches;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use notification_cell::NotificationHub;
    use shared_config::AppConfig;
    use shared_database::InMemoryStore;
    use shared_models::scheduling::{AvailabilityRule, DayOfWeek, WorkingHours};

    // 2030-01-07 is a Monday.
    fn monday_at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 7, hour, 0, 0).unwrap()
    }

    async fn service(billing: MockBillingClient) -> (Arc<InMemoryStore>, AppointmentBookingService, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let config = Arc::new(AppConfig::default());
        let doctor_id = Uuid::new_v4();

        store
            .insert_rule(AvailabilityRule {
                id: Uuid::new_v4(),
                doctor_id,
                day_of_week: DayOfWeek::Monday,
                working_hours: WorkingHours {
                    start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                    end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
                },
                breaks: Vec::new(),
                is_available: true,
                effective_from: NaiveDate::from_ymd_opt(2029, 1, 1).unwrap(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            })
            .await
            .unwrap();

        let service = AppointmentBookingService::new(
            store.clone(),
            AvailabilityService::new(store.clone(), config),
            NotificationDispatcher::new(store.clone(), NotificationHub::new(8)),
            Arc::new(billing),
        );
        (store, service, doctor_id)
    }

    async fn book(service: &AppointmentBookingService, doctor_id: Uuid) -> Appointment {
        let patient_id = Uuid::new_v4();
        service
            .create(
                CreateAppointmentRequest {
                    patient_id,
                    doctor_id,
                    appointment_date: monday_at(10),
                    notes: None,
                },
                patient_id,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_bill_is_requested_once() {
        let mut billing = MockBillingClient::new();
        billing.expect_generate_bill().times(1).returning(|appointment| {
            Ok(Invoice {
                id: "inv-1".to_string(),
                appointment_id: appointment.id,
                status: Some("issued".to_string()),
                amount: Some(120.0),
            })
        });
        let (_, service, doctor_id) = service(billing).await;
        let appointment = book(&service, doctor_id).await;

        let invoice = service.generate_bill(appointment.id).await.unwrap();
        assert_eq!(invoice.appointment_id, appointment.id);
    }

    #[tokio::test]
    async fn test_canceled_appointment_is_never_sent_to_billing() {
        let mut billing = MockBillingClient::new();
        billing.expect_generate_bill().times(0);
        let (_, service, doctor_id) = service(billing).await;
        let appointment = book(&service, doctor_id).await;

        service
            .set_status(appointment.id, AppointmentStatus::Canceled, None)
            .await
            .unwrap();

        assert_matches!(
            service.generate_bill(appointment.id).await,
            Err(AppointmentError::NotBillable)
        );
    }

    #[tokio::test]
    async fn test_billing_failure_leaves_appointment_untouched() {
        let mut billing = MockBillingClient::new();
        billing
            .expect_generate_bill()
            .returning(|_| Err(BillingError::NotConfigured));
        let (store, service, doctor_id) = service(billing).await;
        let appointment = book(&service, doctor_id).await;

        let err = service.generate_bill(appointment.id).await.unwrap_err();
        assert_eq!(err.reason_code(), "billing_failed");

        let stored = store.get_appointment(appointment.id).await.unwrap();
        assert_eq!(stored, appointment);
    }
}
