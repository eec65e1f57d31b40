use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use shared_config::AppConfig;
use shared_database::SchedulingStore;
use shared_models::scheduling::{BreakInterval, DayOfWeek, DayOffType, WorkingHours};

use crate::services::rules::{Decision, DenyReason};

/// Router state of the doctor cell.
#[derive(Clone)]
pub struct DoctorState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn SchedulingStore>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRuleRequest {
    pub day_of_week: DayOfWeek,
    pub working_hours: WorkingHours,
    #[serde(default)]
    pub breaks: Vec<BreakInterval>,
    #[serde(default = "default_true")]
    pub is_available: bool,
    pub effective_from: NaiveDate,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRuleRequest {
    pub day_of_week: Option<DayOfWeek>,
    pub working_hours: Option<WorkingHours>,
    pub breaks: Option<Vec<BreakInterval>>,
    pub is_available: Option<bool>,
    pub effective_from: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDayOffRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(rename = "type")]
    pub day_off_type: DayOffType,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckQuery {
    pub at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityCheck {
    pub allow: bool,
    pub reason: Option<DenyReason>,
}

impl From<Decision> for AvailabilityCheck {
    fn from(decision: Decision) -> Self {
        Self {
            allow: decision.is_allowed(),
            reason: decision.reason(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AvailableSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}
