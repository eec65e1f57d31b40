use thiserror::Error;

use appointment_cell::AppointmentError;
use shared_database::StoreError;
use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum WaitingQueueError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Queue entry is no longer waiting")]
    EntryNotWaiting,

    #[error("Queue entry has expired")]
    EntryExpired,

    #[error("Queue entry was changed by another request")]
    EntryChanged,

    #[error(transparent)]
    Appointment(#[from] AppointmentError),

    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl WaitingQueueError {
    pub fn reason_code(&self) -> &str {
        match self {
            WaitingQueueError::NotFound(_) => "not_found",
            WaitingQueueError::EntryNotWaiting => "entry_not_waiting",
            WaitingQueueError::EntryExpired => "entry_expired",
            WaitingQueueError::EntryChanged => "entry_changed",
            WaitingQueueError::Appointment(err) => err.reason_code(),
            WaitingQueueError::Store(_) => "database_error",
        }
    }
}

impl From<StoreError> for WaitingQueueError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => WaitingQueueError::NotFound(what),
            StoreError::Conflict(reason) if reason == "entry_not_waiting" => WaitingQueueError::EntryNotWaiting,
            StoreError::Conflict(reason) if reason == "entry_changed" => WaitingQueueError::EntryChanged,
            StoreError::Backend(message) => WaitingQueueError::Store(StoreError::Backend(message)),
            // slot_taken and stale schedules come from the appointment half of a promotion
            other => WaitingQueueError::Appointment(AppointmentError::from(other)),
        }
    }
}

impl From<WaitingQueueError> for AppError {
    fn from(err: WaitingQueueError) -> Self {
        let reason = err.reason_code().to_string();
        match err {
            WaitingQueueError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
            WaitingQueueError::Appointment(inner) => inner.into(),
            WaitingQueueError::Store(store) => AppError::Database(store.to_string()),
            other => AppError::conflict(reason, other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_promotion_conflicts_keep_their_reason() {
        let err = WaitingQueueError::from(StoreError::Conflict("entry_not_waiting".to_string()));
        assert_eq!(err.reason_code(), "entry_not_waiting");

        let err = WaitingQueueError::from(StoreError::Conflict("entry_changed".to_string()));
        assert_eq!(err.reason_code(), "entry_changed");

        let err = WaitingQueueError::from(StoreError::Conflict("slot_taken".to_string()));
        assert_eq!(err.reason_code(), "slot_taken");

        let err = WaitingQueueError::from(StoreError::StaleSnapshot);
        let app: AppError = err.into();
        assert_eq!(app.status_code(), StatusCode::CONFLICT);
        assert_eq!(app.reason(), "availability_changed");
    }

    #[test]
    fn test_expired_entry_is_a_conflict() {
        let app: AppError = WaitingQueueError::EntryExpired.into();
        assert_eq!(app.status_code(), StatusCode::CONFLICT);
        assert_eq!(app.reason(), "entry_expired");
    }
}
