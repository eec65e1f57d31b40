pub mod availability;
pub mod rules;

pub use availability::AvailabilityService;
pub use rules::{evaluate, select_rule, Decision, DenyReason};
