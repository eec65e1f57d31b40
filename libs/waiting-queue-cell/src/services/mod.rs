pub mod queue;

pub use queue::{triage_order, WaitingQueueService};
