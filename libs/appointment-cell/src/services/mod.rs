pub mod billing;
pub mod booking;
pub mod lifecycle;

pub use billing::{BillingClient, BillingError, HttpBillingClient};
pub use booking::AppointmentBookingService;
pub use lifecycle::AppointmentLifecycleService;
