use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use uuid::Uuid;

use doctor_cell::models::{CreateDayOffRequest, CreateRuleRequest, UpdateRuleRequest};
use doctor_cell::{AvailabilityError, AvailabilityService, Decision, DenyReason};
use shared_database::{BookingGuard, InMemoryStore, SchedulingStore};
use shared_models::scheduling::{
    Appointment, AppointmentStatus, BreakInterval, DayOfWeek, DayOffType, WorkingHours,
};
use shared_utils::test_utils::TestConfig;

fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

// 2030-01-07 is a Monday.
fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
}

fn monday_rule() -> CreateRuleRequest {
    CreateRuleRequest {
        day_of_week: DayOfWeek::Monday,
        working_hours: WorkingHours { start: hm(9, 0), end: hm(12, 0) },
        breaks: vec![BreakInterval { start: hm(10, 0), end: hm(10, 30), reason: Some("rounds".to_string()) }],
        is_available: true,
        effective_from: NaiveDate::from_ymd_opt(2029, 1, 1).unwrap(),
    }
}

fn setup() -> (Arc<InMemoryStore>, AvailabilityService) {
    let store = Arc::new(InMemoryStore::new());
    let service = AvailabilityService::new(store.clone(), TestConfig::default().to_arc());
    (store, service)
}

#[tokio::test]
async fn test_create_rule_rejects_inverted_hours() {
    let (_, service) = setup();
    let mut request = monday_rule();
    request.working_hours = WorkingHours { start: hm(17, 0), end: hm(9, 0) };

    let result = service.create_rule(Uuid::new_v4(), request).await;
    assert_matches!(result, Err(AvailabilityError::InvalidTimeRange(_)));
}

#[tokio::test]
async fn test_create_rule_rejects_inverted_break() {
    let (_, service) = setup();
    let mut request = monday_rule();
    request.breaks = vec![BreakInterval { start: hm(11, 0), end: hm(10, 0), reason: None }];

    let result = service.create_rule(Uuid::new_v4(), request).await;
    assert_matches!(result, Err(AvailabilityError::InvalidTimeRange(_)));
}

#[tokio::test]
async fn test_update_rule_of_other_doctor_is_not_found() {
    let (_, service) = setup();
    let rule = service.create_rule(Uuid::new_v4(), monday_rule()).await.unwrap();

    let result = service
        .update_rule(Uuid::new_v4(), rule.id, UpdateRuleRequest::default())
        .await;
    assert_matches!(result, Err(AvailabilityError::NotFound(_)));
}

#[tokio::test]
async fn test_check_reflects_rule_changes_and_moves_guard() {
    let (_, service) = setup();
    let doctor_id = Uuid::new_v4();
    let at = Utc.with_ymd_and_hms(2030, 1, 7, 9, 30, 0).unwrap();

    let (decision, before) = service.check(doctor_id, at).await.unwrap();
    assert_eq!(decision, Decision::Deny(DenyReason::NoSchedule));

    let rule = service.create_rule(doctor_id, monday_rule()).await.unwrap();
    let (decision, after) = service.check(doctor_id, at).await.unwrap();
    assert_eq!(decision, Decision::Allow);
    assert_ne!(before.schedule_revision, after.schedule_revision);

    service
        .update_rule(doctor_id, rule.id, UpdateRuleRequest { is_available: Some(false), ..Default::default() })
        .await
        .unwrap();
    let (decision, _) = service.check(doctor_id, at).await.unwrap();
    assert_eq!(decision, Decision::Deny(DenyReason::UnavailableDay));
}

#[tokio::test]
async fn test_day_off_lifecycle() {
    let (_, service) = setup();
    let doctor_id = Uuid::new_v4();
    service.create_rule(doctor_id, monday_rule()).await.unwrap();

    let inverted = service
        .create_day_off(
            doctor_id,
            CreateDayOffRequest {
                start_date: monday(),
                end_date: monday() - Duration::days(1),
                day_off_type: DayOffType::Vacation,
                reason: None,
            },
        )
        .await;
    assert_matches!(inverted, Err(AvailabilityError::InvalidDateRange));

    let day_off = service
        .create_day_off(
            doctor_id,
            CreateDayOffRequest {
                start_date: monday(),
                end_date: monday(),
                day_off_type: DayOffType::Training,
                reason: Some("conference".to_string()),
            },
        )
        .await
        .unwrap();

    let at = Utc.with_ymd_and_hms(2030, 1, 7, 9, 30, 0).unwrap();
    assert_eq!(service.check(doctor_id, at).await.unwrap().0, Decision::Deny(DenyReason::DayOff));

    service.delete_day_off(doctor_id, day_off.id).await.unwrap();
    assert_eq!(service.check(doctor_id, at).await.unwrap().0, Decision::Allow);
    assert!(service.list_days_off(doctor_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_available_slots_skip_breaks_and_booked_slots() {
    let (store, service) = setup();
    let doctor_id = Uuid::new_v4();
    service.create_rule(doctor_id, monday_rule()).await.unwrap();

    let snapshot = store.availability_snapshot(doctor_id).await.unwrap();
    let now = Utc::now();
    store
        .insert_appointment(
            Appointment {
                id: Uuid::new_v4(),
                patient_id: Uuid::new_v4(),
                doctor_id,
                appointment_date: Utc.with_ymd_and_hms(2030, 1, 7, 11, 0, 0).unwrap(),
                status: AppointmentStatus::Pending,
                notes: None,
                is_follow_up: false,
                parent_appointment_id: None,
                confirmation_sent_at: None,
                confirmed_by_patient: false,
                audit_trail: Vec::new(),
                version: 0,
                created_at: now,
                updated_at: now,
            },
            BookingGuard::new(snapshot.revision, 30),
        )
        .await
        .unwrap();

    let slots = service.available_slots(doctor_id, monday(), now).await.unwrap();
    let starts: Vec<String> = slots.iter().map(|s| s.start.format("%H:%M").to_string()).collect();

    // 10:00 and 10:30 touch the inclusive break, 11:00 is booked.
    assert_eq!(starts, vec!["09:00", "09:30", "11:30"]);
    assert_eq!(slots[0].end - slots[0].start, Duration::minutes(30));
}

#[tokio::test]
async fn test_available_slots_exclude_past() {
    let (_, service) = setup();
    let doctor_id = Uuid::new_v4();
    service.create_rule(doctor_id, monday_rule()).await.unwrap();

    let now = Utc.with_ymd_and_hms(2030, 1, 7, 9, 15, 0).unwrap();
    let slots = service.available_slots(doctor_id, monday(), now).await.unwrap();
    assert_eq!(slots.first().map(|s| s.start.format("%H:%M").to_string()), Some("09:30".to_string()));
}

#[tokio::test]
async fn test_available_slots_are_whole_slots() {
    let (_, service) = setup();
    let doctor_id = Uuid::new_v4();
    let mut request = monday_rule();
    request.working_hours = WorkingHours { start: hm(9, 0), end: hm(11, 45) };
    request.breaks = vec![BreakInterval { start: hm(10, 15), end: hm(10, 30), reason: None }];
    service.create_rule(doctor_id, request).await.unwrap();

    let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    let slots = service.available_slots(doctor_id, monday(), now).await.unwrap();
    let starts: Vec<String> = slots.iter().map(|s| s.start.format("%H:%M").to_string()).collect();

    // 10:00 runs into the break, 10:30 touches its end and 11:30 would end
    // after closing.
    assert_eq!(starts, vec!["09:00", "09:30", "11:00"]);
}
