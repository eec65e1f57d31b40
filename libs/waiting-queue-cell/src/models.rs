use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appointment_cell::AppointmentState;
use shared_config::AppConfig;
use shared_database::QueueFilter;
use shared_models::scheduling::{QueuePriority, QueueStatus};

use crate::services::WaitingQueueService;

/// Router state of the waiting queue. Promotion books through the
/// appointment cell, so its state is carried along.
#[derive(Clone)]
pub struct WaitingQueueState {
    pub config: Arc<AppConfig>,
    pub appointments: AppointmentState,
}

impl WaitingQueueState {
    pub fn queue(&self) -> WaitingQueueService {
        WaitingQueueService::new(
            self.appointments.store.clone(),
            self.appointments.booking(),
            self.appointments.dispatcher.clone(),
            self.config.waiting_queue_ttl_hours,
        )
    }
}

fn default_priority() -> QueuePriority {
    QueuePriority::Medium
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateQueueEntryRequest {
    #[serde(alias = "patientId")]
    pub patient_id: Uuid,
    #[serde(alias = "doctorId")]
    pub doctor_id: Uuid,
    #[serde(default = "default_priority")]
    pub priority: QueuePriority,
    #[serde(alias = "requestedDate")]
    pub requested_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePriorityRequest {
    pub priority: QueuePriority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntryRequest {
    #[serde(alias = "appointmentDate")]
    pub appointment_date: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueueQueryParams {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub status: Option<QueueStatus>,
}

impl From<QueueQueryParams> for QueueFilter {
    fn from(params: QueueQueryParams) -> Self {
        QueueFilter {
            doctor_id: params.doctor_id,
            patient_id: params.patient_id,
            status: params.status,
        }
    }
}
