pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use error::WaitingQueueError;
pub use models::WaitingQueueState;
pub use services::{triage_order, WaitingQueueService};
