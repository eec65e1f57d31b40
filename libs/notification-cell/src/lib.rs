pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::NotificationError;
pub use models::{NewNotification, NotificationState};
pub use services::{NotificationDispatcher, NotificationHub};
