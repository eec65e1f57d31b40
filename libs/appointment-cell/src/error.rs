use thiserror::Error;

use doctor_cell::{AvailabilityError, DenyReason};
use shared_database::StoreError;
use shared_models::error::AppError;
use shared_models::scheduling::AppointmentStatus;

use crate::services::billing::BillingError;

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{}", .0.message())]
    Unavailable(DenyReason),

    #[error("Appointment date must be in the future")]
    PastDate,

    #[error("Cannot move appointment from {from} to {to}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Appointment is already in a terminal state")]
    TerminalState,

    #[error("Doctor already has an appointment in this slot")]
    SlotTaken,

    #[error("Doctor availability changed while booking, please retry")]
    AvailabilityChanged,

    #[error("Appointment was modified concurrently, please refresh")]
    StatusChanged,

    #[error("Follow-up requires a completed appointment, parent is {0}")]
    FollowUpRequiresCompleted(AppointmentStatus),

    #[error("Canceled appointments cannot be billed")]
    NotBillable,

    #[error("Billing failed: {0}")]
    BillingFailed(#[from] BillingError),

    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl AppointmentError {
    pub fn reason_code(&self) -> &str {
        match self {
            AppointmentError::NotFound(_) => "not_found",
            AppointmentError::Unavailable(reason) => reason.code(),
            AppointmentError::PastDate => "past_date",
            AppointmentError::InvalidTransition { .. } => "invalid_transition",
            AppointmentError::TerminalState => "terminal_state",
            AppointmentError::SlotTaken => "slot_taken",
            AppointmentError::AvailabilityChanged => "availability_changed",
            AppointmentError::StatusChanged => "status_changed",
            AppointmentError::FollowUpRequiresCompleted(_) => "follow_up_requires_completed",
            AppointmentError::NotBillable => "not_billable",
            AppointmentError::BillingFailed(_) => "billing_failed",
            AppointmentError::Store(_) => "database_error",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            AppointmentError::Unavailable(_)
                | AppointmentError::PastDate
                | AppointmentError::InvalidTransition { .. }
                | AppointmentError::FollowUpRequiresCompleted(_)
                | AppointmentError::NotBillable
        )
    }
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppointmentError::NotFound(what),
            StoreError::StaleSnapshot => AppointmentError::AvailabilityChanged,
            StoreError::Conflict(reason) => match reason.as_str() {
                "slot_taken" => AppointmentError::SlotTaken,
                "terminal_state" => AppointmentError::TerminalState,
                "status_changed" => AppointmentError::StatusChanged,
                _ => AppointmentError::Store(StoreError::Conflict(reason)),
            },
            other => AppointmentError::Store(other),
        }
    }
}

impl From<AvailabilityError> for AppointmentError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::NotFound(what) => AppointmentError::NotFound(what),
            AvailabilityError::Store(store) => AppointmentError::from(store),
            other => AppointmentError::Store(StoreError::Backend(other.to_string())),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        let reason = err.reason_code().to_string();
        let message = err.to_string();

        if err.is_validation() {
            return AppError::validation(reason, message);
        }

        match err {
            AppointmentError::NotFound(_) => AppError::NotFound(message),
            AppointmentError::BillingFailed(_) => AppError::external(reason, message),
            AppointmentError::Store(_) => AppError::Database(message),
            _ => AppError::conflict(reason, message),
        }
    }
}
