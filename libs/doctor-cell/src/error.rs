use thiserror::Error;

use shared_database::StoreError;
use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum AvailabilityError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Day off must not end before it starts")]
    InvalidDateRange,

    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl AvailabilityError {
    pub fn reason_code(&self) -> &str {
        match self {
            AvailabilityError::NotFound(_) => "not_found",
            AvailabilityError::InvalidTimeRange(_) | AvailabilityError::InvalidDateRange => {
                "validation_error"
            }
            AvailabilityError::Store(_) => "database_error",
        }
    }
}

impl From<StoreError> for AvailabilityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AvailabilityError::NotFound(what),
            other => AvailabilityError::Store(other),
        }
    }
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        let reason = err.reason_code().to_string();
        match err {
            AvailabilityError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
            AvailabilityError::Store(store) => AppError::Database(store.to_string()),
            other => AppError::validation(reason, other.to_string()),
        }
    }
}
