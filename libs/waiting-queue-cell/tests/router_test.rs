use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{NaiveDate, NaiveTime, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::{AppointmentState, HttpBillingClient};
use notification_cell::{NotificationDispatcher, NotificationHub};
use shared_config::AppConfig;
use shared_database::{InMemoryStore, SchedulingStore};
use shared_models::scheduling::{AvailabilityRule, DayOfWeek, WorkingHours};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};
use waiting_queue_cell::router::waiting_queue_routes;
use waiting_queue_cell::WaitingQueueState;

async fn create_test_app(doctor: &TestUser) -> (Router, AppConfig) {
    let config = TestConfig::default().to_app_config();
    let config_arc = Arc::new(config.clone());
    let store = Arc::new(InMemoryStore::new());

    store
        .insert_rule(AvailabilityRule {
            id: Uuid::new_v4(),
            doctor_id: doctor.uuid(),
            day_of_week: DayOfWeek::Monday,
            working_hours: WorkingHours {
                start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            },
            breaks: Vec::new(),
            is_available: true,
            effective_from: NaiveDate::from_ymd_opt(2029, 1, 1).unwrap(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        })
        .await
        .unwrap();

    let state = WaitingQueueState {
        config: config_arc.clone(),
        appointments: AppointmentState {
            config: config_arc.clone(),
            store: store.clone(),
            dispatcher: NotificationDispatcher::new(store, NotificationHub::new(8)),
            billing: HttpBillingClient::from_config(&config_arc),
        },
    };
    (waiting_queue_routes(state), config)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, bearer: String, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", bearer)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn join_queue(app: &Router, config: &AppConfig, patient: &TestUser, doctor: &TestUser, priority: &str) -> Value {
    let request = json_request(
        "POST",
        "/",
        JwtTestUtils::bearer(patient, config),
        json!({ "patientId": patient.id, "doctorId": doctor.id, "priority": priority }),
    );
    let (status, body) = send(app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

#[tokio::test]
async fn test_patient_joins_for_self_only() {
    let doctor = TestUser::doctor("doc@example.com");
    let (app, config) = create_test_app(&doctor).await;
    let patient = TestUser::patient("pat@example.com");

    let entry = join_queue(&app, &config, &patient, &doctor, "high").await;
    assert_eq!(entry["status"], "waiting");
    assert_eq!(entry["priority"], "high");

    let other = TestUser::patient("other@example.com");
    let request = json_request(
        "POST",
        "/",
        JwtTestUtils::bearer(&other, &config),
        json!({ "patient_id": patient.id, "doctor_id": doctor.id }),
    );
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_staff_sees_triage_order_and_promotes() {
    let doctor = TestUser::doctor("doc@example.com");
    let (app, config) = create_test_app(&doctor).await;
    let receptionist = TestUser::receptionist("desk@example.com");

    let low = join_queue(&app, &config, &TestUser::patient("a@example.com"), &doctor, "low").await;
    let urgent = join_queue(&app, &config, &TestUser::patient("b@example.com"), &doctor, "urgent").await;

    let request = Request::builder()
        .uri("/")
        .header("authorization", JwtTestUtils::bearer(&receptionist, &config))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"][0]["id"], urgent["id"]);
    assert_eq!(body["entries"][1]["id"], low["id"]);

    let uri = format!("/{}/schedule", urgent["id"].as_str().unwrap());
    let request = json_request(
        "POST",
        &uri,
        JwtTestUtils::bearer(&receptionist, &config),
        json!({ "appointmentDate": "2030-01-07T10:00:00Z", "notes": "from waiting list" }),
    );
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["entry"]["status"], "scheduled");
    assert_eq!(body["entry"]["scheduled_appointment_id"], body["appointment"]["id"]);

    let request = json_request(
        "POST",
        &uri,
        JwtTestUtils::bearer(&receptionist, &config),
        json!({ "appointmentDate": "2030-01-07T11:00:00Z" }),
    );
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["reason"], "entry_not_waiting");
}

#[tokio::test]
async fn test_patient_cannot_promote_or_reprioritize() {
    let doctor = TestUser::doctor("doc@example.com");
    let (app, config) = create_test_app(&doctor).await;
    let patient = TestUser::patient("pat@example.com");
    let entry = join_queue(&app, &config, &patient, &doctor, "medium").await;
    let id = entry["id"].as_str().unwrap();

    let request = json_request(
        "PUT",
        &format!("/{}", id),
        JwtTestUtils::bearer(&patient, &config),
        json!({ "priority": "urgent" }),
    );
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = json_request(
        "POST",
        &format!("/{}/schedule", id),
        JwtTestUtils::bearer(&patient, &config),
        json!({ "appointmentDate": "2030-01-07T10:00:00Z" }),
    );
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/{}", id))
        .header("authorization", JwtTestUtils::bearer(&patient, &config))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "canceled");
}

#[tokio::test]
async fn test_promotion_into_unavailable_time_reports_engine_reason() {
    let doctor = TestUser::doctor("doc@example.com");
    let (app, config) = create_test_app(&doctor).await;
    let admin = TestUser::admin("admin@example.com");
    let entry = join_queue(&app, &config, &TestUser::patient("p@example.com"), &doctor, "high").await;

    // Tuesday has no rule.
    let request = json_request(
        "POST",
        &format!("/{}/schedule", entry["id"].as_str().unwrap()),
        JwtTestUtils::bearer(&admin, &config),
        json!({ "appointmentDate": "2030-01-08T10:00:00Z" }),
    );
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["reason"], "no_schedule");

    let request = Request::builder()
        .method("POST")
        .uri("/expire")
        .header("authorization", JwtTestUtils::bearer(&admin, &config))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
}
