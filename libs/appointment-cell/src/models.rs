use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use doctor_cell::AvailabilityService;
use notification_cell::NotificationDispatcher;
use shared_config::AppConfig;
use shared_database::{AppointmentFilter, SchedulingStore};
use shared_models::scheduling::AppointmentStatus;

use crate::services::billing::BillingClient;
use crate::services::booking::AppointmentBookingService;

/// Router state of the appointment cell.
#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn SchedulingStore>,
    pub dispatcher: NotificationDispatcher,
    pub billing: Arc<dyn BillingClient>,
}

impl AppointmentState {
    pub fn availability(&self) -> AvailabilityService {
        AvailabilityService::new(self.store.clone(), self.config.clone())
    }

    pub fn booking(&self) -> AppointmentBookingService {
        AppointmentBookingService::new(
            self.store.clone(),
            self.availability(),
            self.dispatcher.clone(),
            self.billing.clone(),
        )
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    #[serde(alias = "patientId")]
    pub patient_id: Uuid,
    #[serde(alias = "doctorId")]
    pub doctor_id: Uuid,
    #[serde(alias = "appointmentDate")]
    pub appointment_date: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleRequest {
    #[serde(alias = "newDate")]
    pub new_date: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpRequest {
    #[serde(alias = "followUpDate")]
    pub follow_up_date: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentQueryParams {
    pub patient_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

impl From<AppointmentQueryParams> for AppointmentFilter {
    fn from(params: AppointmentQueryParams) -> Self {
        AppointmentFilter {
            patient_id: params.patient_id,
            doctor_id: params.doctor_id,
            status: params.status,
            from: params.from_date,
            to: params.to_date,
        }
    }
}

// ==============================================================================
// BILLING MODELS
// ==============================================================================

/// Body posted to the billing service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvoiceRequest {
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub is_follow_up: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Invoice {
    pub id: String,
    pub appointment_id: Uuid,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<f64>,
}
