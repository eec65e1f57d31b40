pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::AppointmentError;
pub use models::AppointmentState;
pub use services::{AppointmentBookingService, BillingClient, HttpBillingClient};
