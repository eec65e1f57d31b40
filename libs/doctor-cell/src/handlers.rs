use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::extractor::require_owner_or_role;

use crate::models::{
    AvailabilityCheck, CheckQuery, CreateDayOffRequest, CreateRuleRequest, DoctorState, SlotsQuery,
    UpdateRuleRequest,
};
use crate::services::AvailabilityService;

fn service(state: &DoctorState) -> AvailabilityService {
    AvailabilityService::new(state.store.clone(), state.config.clone())
}

fn require_schedule_owner(user: &User, doctor_id: Uuid) -> Result<(), AppError> {
    require_owner_or_role(user, Role::Doctor, doctor_id, &[Role::Admin])
}

// ==============================================================================
// AVAILABILITY RULES
// ==============================================================================

#[axum::debug_handler]
pub async fn list_rules(
    State(state): State<DoctorState>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let rules = service(&state).list_rules(doctor_id).await?;
    Ok(Json(json!(rules)))
}

#[axum::debug_handler]
pub async fn create_rule(
    State(state): State<DoctorState>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateRuleRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_schedule_owner(&user, doctor_id)?;

    let rule = service(&state).create_rule(doctor_id, request).await?;
    Ok((StatusCode::CREATED, Json(json!(rule))))
}

#[axum::debug_handler]
pub async fn update_rule(
    State(state): State<DoctorState>,
    Path((doctor_id, rule_id)): Path<(Uuid, Uuid)>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateRuleRequest>,
) -> Result<Json<Value>, AppError> {
    require_schedule_owner(&user, doctor_id)?;

    let rule = service(&state).update_rule(doctor_id, rule_id, request).await?;
    Ok(Json(json!(rule)))
}

#[axum::debug_handler]
pub async fn delete_rule(
    State(state): State<DoctorState>,
    Path((doctor_id, rule_id)): Path<(Uuid, Uuid)>,
    Extension(user): Extension<User>,
) -> Result<StatusCode, AppError> {
    require_schedule_owner(&user, doctor_id)?;

    service(&state).delete_rule(doctor_id, rule_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==============================================================================
// DAYS OFF
// ==============================================================================

#[axum::debug_handler]
pub async fn list_days_off(
    State(state): State<DoctorState>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let days_off = service(&state).list_days_off(doctor_id).await?;
    Ok(Json(json!(days_off)))
}

#[axum::debug_handler]
pub async fn create_day_off(
    State(state): State<DoctorState>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateDayOffRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_schedule_owner(&user, doctor_id)?;

    let day_off = service(&state).create_day_off(doctor_id, request).await?;
    Ok((StatusCode::CREATED, Json(json!(day_off))))
}

#[axum::debug_handler]
pub async fn delete_day_off(
    State(state): State<DoctorState>,
    Path((doctor_id, day_off_id)): Path<(Uuid, Uuid)>,
    Extension(user): Extension<User>,
) -> Result<StatusCode, AppError> {
    require_schedule_owner(&user, doctor_id)?;

    service(&state).delete_day_off(doctor_id, day_off_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==============================================================================
// EVALUATION
// ==============================================================================

/// Advisory pre-check. Bookings are evaluated again when written.
#[axum::debug_handler]
pub async fn check_availability(
    State(state): State<DoctorState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<CheckQuery>,
) -> Result<Json<AvailabilityCheck>, AppError> {
    let (decision, _) = service(&state).check(doctor_id, query.at).await?;
    Ok(Json(decision.into()))
}

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<DoctorState>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = service(&state)
        .available_slots(doctor_id, query.date, Utc::now())
        .await?;

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "date": query.date,
        "slots": slots,
    })))
}
