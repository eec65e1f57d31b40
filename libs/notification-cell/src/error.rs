use thiserror::Error;

use shared_database::StoreError;
use shared_models::error::AppError;

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Notification not found: {0}")]
    NotFound(String),

    #[error("Only the recipient may update a notification")]
    NotRecipient,

    #[error("Storage error: {0}")]
    Store(StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl NotificationError {
    pub fn reason_code(&self) -> &str {
        match self {
            NotificationError::NotFound(_) => "not_found",
            NotificationError::NotRecipient => "forbidden",
            NotificationError::Store(_) => "database_error",
            NotificationError::Serialization(_) => "internal_error",
        }
    }
}

impl From<StoreError> for NotificationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => NotificationError::NotFound(what),
            other => NotificationError::Store(other),
        }
    }
}

impl From<NotificationError> for AppError {
    fn from(err: NotificationError) -> Self {
        match err {
            NotificationError::NotFound(what) => AppError::NotFound(what),
            NotificationError::NotRecipient => {
                AppError::Forbidden("Only the recipient may update a notification".to_string())
            }
            NotificationError::Store(store) => AppError::Database(store.to_string()),
            NotificationError::Serialization(e) => AppError::Internal(e.to_string()),
        }
    }
}
