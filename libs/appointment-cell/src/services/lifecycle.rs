// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{info, warn};

use shared_models::scheduling::AppointmentStatus;

use crate::error::AppointmentError;

/// Appointment status state machine.
///
/// ```text
/// pending     -> confirmed | canceled
/// confirmed   -> completed | canceled | rescheduled
/// rescheduled -> pending | confirmed | canceled
/// completed, canceled: terminal
/// ```
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Rejects any edge not in the table. Leaving a terminal state is a
    /// conflict rather than a validation failure.
    pub fn validate_status_transition(
        &self,
        current: AppointmentStatus,
        new: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        if current.is_terminal() {
            warn!("Rejected transition out of terminal status {} to {}", current, new);
            return Err(AppointmentError::TerminalState);
        }

        if !self.get_valid_transitions(current).contains(&new) {
            warn!("Invalid status transition attempted: {} -> {}", current, new);
            return Err(AppointmentError::InvalidTransition { from: current, to: new });
        }

        info!("Status transition validated: {} -> {}", current, new);
        Ok(())
    }

    pub fn get_valid_transitions(&self, current: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Pending => vec![AppointmentStatus::Confirmed, AppointmentStatus::Canceled],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::Completed,
                AppointmentStatus::Canceled,
                AppointmentStatus::Rescheduled,
            ],
            AppointmentStatus::Rescheduled => vec![
                AppointmentStatus::Pending,
                AppointmentStatus::Confirmed,
                AppointmentStatus::Canceled,
            ],
            AppointmentStatus::Completed | AppointmentStatus::Canceled => vec![],
        }
    }

    /// Statuses from which the date may be moved.
    pub fn validate_reschedulable(&self, current: AppointmentStatus) -> Result<(), AppointmentError> {
        match current {
            AppointmentStatus::Pending | AppointmentStatus::Confirmed | AppointmentStatus::Rescheduled => Ok(()),
            terminal if terminal.is_terminal() => Err(AppointmentError::TerminalState),
            other => Err(AppointmentError::InvalidTransition {
                from: other,
                to: AppointmentStatus::Rescheduled,
            }),
        }
    }

    /// Statuses in which the patient acknowledgement flow applies.
    pub fn validate_awaiting_visit(&self, current: AppointmentStatus) -> Result<(), AppointmentError> {
        match current {
            AppointmentStatus::Pending | AppointmentStatus::Confirmed => Ok(()),
            terminal if terminal.is_terminal() => Err(AppointmentError::TerminalState),
            other => Err(AppointmentError::InvalidTransition {
                from: other,
                to: AppointmentStatus::Confirmed,
            }),
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}
