// libs/doctor-cell/src/services/availability.rs

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{AppointmentFilter, BookingGuard, SchedulingStore};
use shared_models::scheduling::{AvailabilityRule, AvailabilitySnapshot, BreakInterval, DayOff, WorkingHours};

use crate::error::AvailabilityError;
use crate::models::{AvailableSlot, CreateDayOffRequest, CreateRuleRequest, UpdateRuleRequest};
use crate::services::rules::{evaluate, select_rule, slot_fits, Decision};

pub struct AvailabilityService {
    store: Arc<dyn SchedulingStore>,
    config: Arc<AppConfig>,
}

fn validate_hours(hours: &WorkingHours, breaks: &[BreakInterval]) -> Result<(), AvailabilityError> {
    if hours.start >= hours.end {
        return Err(AvailabilityError::InvalidTimeRange(
            "working hours must start before they end".to_string(),
        ));
    }
    for interval in breaks {
        if interval.start >= interval.end {
            return Err(AvailabilityError::InvalidTimeRange(format!(
                "break {}-{} must start before it ends",
                interval.start.format("%H:%M"),
                interval.end.format("%H:%M")
            )));
        }
    }
    Ok(())
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn SchedulingStore>, config: Arc<AppConfig>) -> Self {
        Self { store, config }
    }

    // ==========================================================================
    // RULES
    // ==========================================================================

    pub async fn list_rules(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityRule>, AvailabilityError> {
        debug!("Fetching availability rules for doctor: {}", doctor_id);
        Ok(self.store.list_rules(doctor_id).await?)
    }

    pub async fn create_rule(
        &self,
        doctor_id: Uuid,
        request: CreateRuleRequest,
    ) -> Result<AvailabilityRule, AvailabilityError> {
        debug!("Creating {} availability rule for doctor: {}", request.day_of_week, doctor_id);

        validate_hours(&request.working_hours, &request.breaks)?;

        let now = Utc::now();
        let rule = AvailabilityRule {
            id: Uuid::new_v4(),
            doctor_id,
            day_of_week: request.day_of_week,
            working_hours: request.working_hours,
            breaks: request.breaks,
            is_available: request.is_available,
            effective_from: request.effective_from,
            created_at: now,
            updated_at: now,
        };

        let rule = self.store.insert_rule(rule).await?;
        info!("Availability rule {} created for doctor {}", rule.id, doctor_id);
        Ok(rule)
    }

    pub async fn update_rule(
        &self,
        doctor_id: Uuid,
        rule_id: Uuid,
        request: UpdateRuleRequest,
    ) -> Result<AvailabilityRule, AvailabilityError> {
        debug!("Updating availability rule: {}", rule_id);

        let mut rule = self.owned_rule(doctor_id, rule_id).await?;

        if let Some(day) = request.day_of_week {
            rule.day_of_week = day;
        }
        if let Some(hours) = request.working_hours {
            rule.working_hours = hours;
        }
        if let Some(breaks) = request.breaks {
            rule.breaks = breaks;
        }
        if let Some(is_available) = request.is_available {
            rule.is_available = is_available;
        }
        if let Some(effective_from) = request.effective_from {
            rule.effective_from = effective_from;
        }

        validate_hours(&rule.working_hours, &rule.breaks)?;
        rule.updated_at = Utc::now();

        let rule = self.store.update_rule(rule).await?;
        info!("Availability rule {} updated", rule.id);
        Ok(rule)
    }

    pub async fn delete_rule(&self, doctor_id: Uuid, rule_id: Uuid) -> Result<(), AvailabilityError> {
        self.owned_rule(doctor_id, rule_id).await?;
        self.store.delete_rule(rule_id).await?;
        info!("Availability rule {} deleted", rule_id);
        Ok(())
    }

    async fn owned_rule(&self, doctor_id: Uuid, rule_id: Uuid) -> Result<AvailabilityRule, AvailabilityError> {
        let rule = self.store.get_rule(rule_id).await?;
        if rule.doctor_id != doctor_id {
            return Err(AvailabilityError::NotFound(format!("availability rule {}", rule_id)));
        }
        Ok(rule)
    }

    // ==========================================================================
    // DAYS OFF
    // ==========================================================================

    pub async fn list_days_off(&self, doctor_id: Uuid) -> Result<Vec<DayOff>, AvailabilityError> {
        Ok(self.store.list_days_off(doctor_id).await?)
    }

    pub async fn create_day_off(
        &self,
        doctor_id: Uuid,
        request: CreateDayOffRequest,
    ) -> Result<DayOff, AvailabilityError> {
        if request.start_date > request.end_date {
            return Err(AvailabilityError::InvalidDateRange);
        }

        let day_off = DayOff {
            id: Uuid::new_v4(),
            doctor_id,
            start_date: request.start_date,
            end_date: request.end_date,
            day_off_type: request.day_off_type,
            reason: request.reason,
            created_at: Utc::now(),
        };

        let day_off = self.store.insert_day_off(day_off).await?;
        info!(
            "Day off {} ({} to {}) created for doctor {}",
            day_off.id, day_off.start_date, day_off.end_date, doctor_id
        );
        Ok(day_off)
    }

    pub async fn delete_day_off(&self, doctor_id: Uuid, day_off_id: Uuid) -> Result<(), AvailabilityError> {
        let day_off = self.store.get_day_off(day_off_id).await?;
        if day_off.doctor_id != doctor_id {
            return Err(AvailabilityError::NotFound(format!("day off {}", day_off_id)));
        }
        self.store.delete_day_off(day_off_id).await?;
        info!("Day off {} canceled", day_off_id);
        Ok(())
    }

    // ==========================================================================
    // EVALUATION
    // ==========================================================================

    pub async fn snapshot(&self, doctor_id: Uuid) -> Result<AvailabilitySnapshot, AvailabilityError> {
        Ok(self.store.availability_snapshot(doctor_id).await?)
    }

    /// Evaluates `at` and returns the guard a subsequent booking must carry
    /// so the write fails if the schedule changes in between.
    pub async fn check(
        &self,
        doctor_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(Decision, BookingGuard), AvailabilityError> {
        let snapshot = self.snapshot(doctor_id).await?;
        let decision = evaluate(&snapshot, at, self.config.clinic_offset());
        debug!("Availability of doctor {} at {}: {:?}", doctor_id, at, decision);
        Ok((decision, self.guard_for(&snapshot)))
    }

    pub fn guard_for(&self, snapshot: &AvailabilitySnapshot) -> BookingGuard {
        BookingGuard::new(snapshot.revision, self.config.appointment_slot_minutes)
    }

    /// Whole slots on `date` inside the working window and clear of breaks,
    /// starting after `now` at an instant the engine allows and not
    /// overlapping an active appointment. A start exactly at closing time
    /// passes `evaluate` but never makes a slot.
    pub async fn available_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<AvailableSlot>, AvailabilityError> {
        debug!("Calculating available slots for doctor {} on {}", doctor_id, date);

        let snapshot = self.snapshot(doctor_id).await?;
        let offset = self.config.clinic_offset();
        let slot_minutes = self.config.appointment_slot_minutes.max(1);
        let slot = Duration::minutes(slot_minutes);

        let rule = match select_rule(&snapshot.rules, date) {
            Some(rule) if rule.is_available => rule,
            _ => return Ok(Vec::new()),
        };

        let to_utc = |time: NaiveTime| {
            offset
                .from_local_datetime(&date.and_time(time))
                .single()
                .map(|local| local.with_timezone(&Utc))
        };

        let (day_start, day_end) = match (to_utc(rule.working_hours.start), to_utc(rule.working_hours.end)) {
            (Some(start), Some(end)) => (start, end),
            _ => return Ok(Vec::new()),
        };

        let booked = self
            .store
            .list_appointments(&AppointmentFilter {
                doctor_id: Some(doctor_id),
                from: Some(day_start - slot),
                to: Some(day_end + slot),
                ..Default::default()
            })
            .await?;
        let guard = self.guard_for(&snapshot);

        let mut slots = Vec::new();
        let mut start = day_start;
        while start + slot <= day_end {
            let free = !booked.iter().any(|appointment| {
                appointment.status.occupies_slot() && guard.overlaps(appointment.appointment_date, start)
            });
            let fits = slot_fits(rule, start.with_timezone(&offset).time(), slot_minutes as u32);

            if start > now && free && fits && evaluate(&snapshot, start, offset).is_allowed() {
                slots.push(AvailableSlot { start, end: start + slot });
            }
            start += slot;
        }

        debug!("Found {} available slots for doctor {} on {}", slots.len(), doctor_id, date);
        Ok(slots)
    }
}
