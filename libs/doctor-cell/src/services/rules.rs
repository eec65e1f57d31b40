// libs/doctor-cell/src/services/rules.rs
//
// Availability rule engine. A pure function of one availability snapshot
// and a candidate instant, shared by the advisory check endpoint, slot
// listing and every write path that books a doctor.

use std::fmt;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use shared_models::scheduling::{AvailabilityRule, AvailabilitySnapshot, DayOfWeek};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    DayOff,
    NoSchedule,
    UnavailableDay,
    OutsideHours,
    BreakTime,
}

impl DenyReason {
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::DayOff => "day_off",
            DenyReason::NoSchedule => "no_schedule",
            DenyReason::UnavailableDay => "unavailable_day",
            DenyReason::OutsideHours => "outside_hours",
            DenyReason::BreakTime => "break_time",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::DayOff => "Doctor is off on the requested date",
            DenyReason::NoSchedule => "Doctor has no schedule for the requested day",
            DenyReason::UnavailableDay => "Doctor is not available on the requested day",
            DenyReason::OutsideHours => "Requested time is outside the doctor's working hours",
            DenyReason::BreakTime => "Requested time falls within the doctor's break",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            Decision::Allow => None,
            Decision::Deny(reason) => Some(*reason),
        }
    }
}

fn minute_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// The rule in force on `date`: matching weekday, latest `effective_from`
/// not after the date, ties broken by the most recently created rule.
pub fn select_rule(rules: &[AvailabilityRule], date: NaiveDate) -> Option<&AvailabilityRule> {
    let weekday = DayOfWeek::from(date.weekday());
    rules
        .iter()
        .filter(|rule| rule.day_of_week == weekday && rule.effective_from <= date)
        .max_by_key(|rule| (rule.effective_from, rule.created_at))
}

/// True when `minute` falls inside a break of `rule`, breaks clipped to the
/// working window, bounds inclusive.
fn in_break(rule: &AvailabilityRule, minute: u32) -> bool {
    let window_start = minute_of_day(rule.working_hours.start);
    let window_end = minute_of_day(rule.working_hours.end);

    rule.breaks.iter().any(|interval| {
        let start = minute_of_day(interval.start).max(window_start);
        let end = minute_of_day(interval.end).min(window_end);
        start <= end && start <= minute && minute <= end
    })
}

/// Whether a whole slot of `minutes` starting at `start` fits the working
/// window of `rule` without touching a clipped break. The break end stays
/// inclusive like in `evaluate`; the slot end is exclusive.
pub fn slot_fits(rule: &AvailabilityRule, start: NaiveTime, minutes: u32) -> bool {
    let window_start = minute_of_day(rule.working_hours.start);
    let window_end = minute_of_day(rule.working_hours.end);
    let from = minute_of_day(start);
    let to = from + minutes;

    if from < window_start || to > window_end {
        return false;
    }

    !rule.breaks.iter().any(|interval| {
        let break_start = minute_of_day(interval.start).max(window_start);
        let break_end = minute_of_day(interval.end).min(window_end);
        break_start <= break_end && from <= break_end && break_start < to
    })
}

pub fn evaluate(
    snapshot: &AvailabilitySnapshot,
    candidate: DateTime<Utc>,
    offset: FixedOffset,
) -> Decision {
    let local = candidate.with_timezone(&offset);
    let date = local.date_naive();

    if snapshot.days_off.iter().any(|day_off| day_off.covers(date)) {
        return Decision::Deny(DenyReason::DayOff);
    }

    let rule = match select_rule(&snapshot.rules, date) {
        Some(rule) => rule,
        None => return Decision::Deny(DenyReason::NoSchedule),
    };

    if !rule.is_available {
        return Decision::Deny(DenyReason::UnavailableDay);
    }

    let minute = minute_of_day(local.time());
    let start = minute_of_day(rule.working_hours.start);
    let end = minute_of_day(rule.working_hours.end);

    if minute < start || minute > end {
        return Decision::Deny(DenyReason::OutsideHours);
    }

    if in_break(rule, minute) {
        return Decision::Deny(DenyReason::BreakTime);
    }

    Decision::Allow
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use shared_models::scheduling::{BreakInterval, DayOff, DayOffType, WorkingHours};
    use uuid::Uuid;

    fn hm(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rule(day: DayOfWeek, start: NaiveTime, end: NaiveTime, effective_from: NaiveDate) -> AvailabilityRule {
        AvailabilityRule {
            id: Uuid::new_v4(),
            doctor_id: Uuid::nil(),
            day_of_week: day,
            working_hours: WorkingHours { start, end },
            breaks: Vec::new(),
            is_available: true,
            effective_from,
            created_at: Utc.with_ymd_and_hms(2029, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2029, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn monday_rule_with_lunch() -> AvailabilityRule {
        let mut monday = rule(DayOfWeek::Monday, hm(9, 0), hm(17, 0), date(2029, 1, 1));
        monday.breaks.push(BreakInterval {
            start: hm(12, 0),
            end: hm(13, 0),
            reason: Some("lunch".to_string()),
        });
        monday
    }

    fn snapshot(rules: Vec<AvailabilityRule>, days_off: Vec<DayOff>) -> AvailabilitySnapshot {
        AvailabilitySnapshot {
            doctor_id: Uuid::nil(),
            revision: 1,
            rules,
            days_off,
        }
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    // 2030-01-07 is a Monday.
    fn monday_at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 7, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_break_and_working_time() {
        let snap = snapshot(vec![monday_rule_with_lunch()], vec![]);

        assert_eq!(evaluate(&snap, monday_at(12, 30), utc()), Decision::Deny(DenyReason::BreakTime));
        assert_eq!(evaluate(&snap, monday_at(10, 0), utc()), Decision::Allow);
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let snap = snapshot(vec![monday_rule_with_lunch()], vec![]);

        assert_eq!(evaluate(&snap, monday_at(9, 0), utc()), Decision::Allow);
        assert_eq!(evaluate(&snap, monday_at(17, 0), utc()), Decision::Allow);
        assert_eq!(evaluate(&snap, monday_at(17, 1), utc()), Decision::Deny(DenyReason::OutsideHours));
        assert_eq!(evaluate(&snap, monday_at(8, 59), utc()), Decision::Deny(DenyReason::OutsideHours));
        assert_eq!(evaluate(&snap, monday_at(12, 0), utc()), Decision::Deny(DenyReason::BreakTime));
        assert_eq!(evaluate(&snap, monday_at(13, 0), utc()), Decision::Deny(DenyReason::BreakTime));
        assert_eq!(evaluate(&snap, monday_at(13, 1), utc()), Decision::Allow);
    }

    #[test]
    fn test_day_off_overrides_every_rule() {
        let day_off = DayOff {
            id: Uuid::new_v4(),
            doctor_id: Uuid::nil(),
            start_date: date(2030, 1, 6),
            end_date: date(2030, 1, 7),
            day_off_type: DayOffType::Sick,
            reason: None,
            created_at: Utc::now(),
        };
        let snap = snapshot(vec![monday_rule_with_lunch()], vec![day_off]);

        for hour in 0..24 {
            assert_eq!(evaluate(&snap, monday_at(hour, 15), utc()), Decision::Deny(DenyReason::DayOff));
        }
        // Tuesday is outside the range but has no rule.
        let tuesday = monday_at(10, 0) + Duration::days(1);
        assert_eq!(evaluate(&snap, tuesday, utc()), Decision::Deny(DenyReason::NoSchedule));
    }

    #[test]
    fn test_latest_effective_rule_wins() {
        let old = rule(DayOfWeek::Monday, hm(9, 0), hm(17, 0), date(2029, 1, 1));
        let newer = rule(DayOfWeek::Monday, hm(14, 0), hm(18, 0), date(2029, 6, 1));
        let future = rule(DayOfWeek::Monday, hm(6, 0), hm(8, 0), date(2031, 1, 1));
        let snap = snapshot(vec![old, future, newer], vec![]);

        assert_eq!(evaluate(&snap, monday_at(10, 0), utc()), Decision::Deny(DenyReason::OutsideHours));
        assert_eq!(evaluate(&snap, monday_at(17, 30), utc()), Decision::Allow);
    }

    #[test]
    fn test_effective_from_tie_prefers_latest_created() {
        let mut first = rule(DayOfWeek::Monday, hm(9, 0), hm(17, 0), date(2029, 1, 1));
        first.is_available = false;
        let mut second = rule(DayOfWeek::Monday, hm(9, 0), hm(17, 0), date(2029, 1, 1));
        second.created_at = first.created_at + Duration::hours(1);
        let snap = snapshot(vec![second.clone(), first.clone()], vec![]);

        assert_eq!(evaluate(&snap, monday_at(10, 0), utc()), Decision::Allow);

        second.created_at = first.created_at - Duration::hours(1);
        let snap = snapshot(vec![second, first], vec![]);
        assert_eq!(evaluate(&snap, monday_at(10, 0), utc()), Decision::Deny(DenyReason::UnavailableDay));
    }

    #[test]
    fn test_no_rule_for_weekday() {
        let snap = snapshot(vec![rule(DayOfWeek::Tuesday, hm(9, 0), hm(17, 0), date(2029, 1, 1))], vec![]);
        assert_eq!(evaluate(&snap, monday_at(10, 0), utc()), Decision::Deny(DenyReason::NoSchedule));
    }

    #[test]
    fn test_break_outside_window_is_clipped() {
        let mut monday = rule(DayOfWeek::Monday, hm(9, 0), hm(17, 0), date(2029, 1, 1));
        monday.breaks.push(BreakInterval { start: hm(7, 0), end: hm(9, 30), reason: None });
        monday.breaks.push(BreakInterval { start: hm(18, 0), end: hm(19, 0), reason: None });
        let snap = snapshot(vec![monday], vec![]);

        assert_eq!(evaluate(&snap, monday_at(9, 15), utc()), Decision::Deny(DenyReason::BreakTime));
        assert_eq!(evaluate(&snap, monday_at(9, 45), utc()), Decision::Allow);
        assert_eq!(evaluate(&snap, monday_at(17, 0), utc()), Decision::Allow);
    }

    #[test]
    fn test_clinic_offset_shifts_local_day() {
        // Sunday 23:30 UTC is Monday 10:30 at UTC+11.
        let snap = snapshot(vec![monday_rule_with_lunch()], vec![]);
        let sunday_late = Utc.with_ymd_and_hms(2030, 1, 6, 23, 30, 0).unwrap();
        let plus_eleven = FixedOffset::east_opt(11 * 3600).unwrap();

        assert_eq!(evaluate(&snap, sunday_late, plus_eleven), Decision::Allow);
        assert_eq!(evaluate(&snap, sunday_late, utc()), Decision::Deny(DenyReason::NoSchedule));
    }

    #[test]
    fn test_slot_must_clear_breaks_and_closing_time() {
        let mut monday = rule(DayOfWeek::Monday, hm(9, 0), hm(17, 0), date(2029, 1, 1));
        monday.breaks.push(BreakInterval { start: hm(12, 15), end: hm(13, 0), reason: None });

        assert!(slot_fits(&monday, hm(11, 30), 30));
        // Starts allowed, runs into the break.
        assert!(!slot_fits(&monday, hm(12, 0), 30));
        assert!(!slot_fits(&monday, hm(13, 0), 30));
        assert!(slot_fits(&monday, hm(13, 15), 30));
        assert!(slot_fits(&monday, hm(16, 30), 30));
        assert!(!slot_fits(&monday, hm(16, 45), 30));
        assert!(!slot_fits(&monday, hm(17, 0), 30));

        // Ending exactly where a break starts is fine.
        assert!(slot_fits(&monday, hm(11, 45), 30));
    }
}
