use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use doctor_cell::models::DoctorState;
use doctor_cell::router::doctor_routes;
use shared_config::AppConfig;
use shared_database::InMemoryStore;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn create_test_app() -> (Router, AppConfig) {
    let config = TestConfig::default().to_app_config();
    let state = DoctorState {
        config: Arc::new(config.clone()),
        store: Arc::new(InMemoryStore::new()),
    };
    (doctor_routes(state), config)
}

fn rule_body() -> Value {
    json!({
        "day_of_week": "monday",
        "working_hours": { "start": "09:00", "end": "17:00" },
        "breaks": [{ "start": "12:00", "end": "13:00", "reason": "lunch" }],
        "effective_from": "2029-01-01"
    })
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

#[tokio::test]
async fn test_requests_without_token_are_unauthorized() {
    let (app, _) = create_test_app();
    let doctor = TestUser::doctor("doc@example.com");

    let request = Request::builder()
        .uri(format!("/{}/availability", doctor.id))
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["reason"], "unauthorized");
}

#[tokio::test]
async fn test_doctor_creates_rule_and_patient_checks_it() {
    let (app, config) = create_test_app();
    let doctor = TestUser::doctor("doc@example.com");
    let patient = TestUser::patient("pat@example.com");

    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/availability", doctor.id))
        .header("authorization", JwtTestUtils::bearer(&doctor, &config))
        .header("content-type", "application/json")
        .body(Body::from(rule_body().to_string()))
        .unwrap();
    let (status, created) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["working_hours"]["start"], "09:00");

    let request = Request::builder()
        .uri(format!("/{}/availability/check?at=2030-01-07T12:30:00Z", doctor.id))
        .header("authorization", JwtTestUtils::bearer(&patient, &config))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "allow": false, "reason": "break_time" }));

    let request = Request::builder()
        .uri(format!("/{}/availability/check?at=2030-01-07T10:00:00Z", doctor.id))
        .header("authorization", JwtTestUtils::bearer(&patient, &config))
        .body(Body::empty())
        .unwrap();
    let (_, body) = send(&app, request).await;
    assert_eq!(body, json!({ "allow": true, "reason": null }));
}

#[tokio::test]
async fn test_other_doctor_cannot_edit_schedule() {
    let (app, config) = create_test_app();
    let doctor = TestUser::doctor("doc@example.com");
    let other = TestUser::doctor("other@example.com");

    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/availability", doctor.id))
        .header("authorization", JwtTestUtils::bearer(&other, &config))
        .header("content-type", "application/json")
        .body(Body::from(rule_body().to_string()))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["reason"], "forbidden");
}

#[tokio::test]
async fn test_admin_manages_days_off() {
    let (app, config) = create_test_app();
    let doctor = TestUser::doctor("doc@example.com");
    let admin = TestUser::admin("admin@example.com");

    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/days-off", doctor.id))
        .header("authorization", JwtTestUtils::bearer(&admin, &config))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "start_date": "2030-01-10",
                "end_date": "2030-01-07",
                "type": "vacation"
            })
            .to_string(),
        ))
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["reason"], "validation_error");

    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/days-off", doctor.id))
        .header("authorization", JwtTestUtils::bearer(&admin, &config))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "start_date": "2030-01-07",
                "end_date": "2030-01-10",
                "type": "vacation",
                "reason": "holiday"
            })
            .to_string(),
        ))
        .unwrap();
    let (status, day_off) = send(&app, request).await;
    assert_eq!(status, StatusCode::CREATED);

    let request = Request::builder()
        .method("DELETE")
        .uri(format!("/{}/days-off/{}", doctor.id, day_off["id"].as_str().unwrap()))
        .header("authorization", JwtTestUtils::bearer(&admin, &config))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let request = Request::builder()
        .uri(format!("/{}/days-off", doctor.id))
        .header("authorization", JwtTestUtils::bearer(&doctor, &config))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_available_slots_endpoint() {
    let (app, config) = create_test_app();
    let doctor = TestUser::doctor("doc@example.com");

    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/availability", doctor.id))
        .header("authorization", JwtTestUtils::bearer(&doctor, &config))
        .header("content-type", "application/json")
        .body(Body::from(rule_body().to_string()))
        .unwrap();
    send(&app, request).await;

    let request = Request::builder()
        .uri(format!("/{}/available-slots?date=2030-01-07", doctor.id))
        .header("authorization", JwtTestUtils::bearer(&doctor, &config))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    // 09:00..16:30 in 30 minute steps, minus 12:00, 12:30 and 13:00.
    assert_eq!(body["slots"].as_array().unwrap().len(), 13);
}
