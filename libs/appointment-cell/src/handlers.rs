// libs/appointment-cell/src/handlers.rs
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use shared_database::AppointmentFilter;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_models::scheduling::{Appointment, AppointmentStatus};
use shared_utils::extractor::{require_owner_or_role, require_staff, user_uuid};

use crate::models::{
    AppointmentQueryParams, AppointmentState, CreateAppointmentRequest, FollowUpRequest,
    RescheduleRequest, UpdateStatusRequest,
};

// ==============================================================================
// ACCESS CHECKS
// ==============================================================================

/// Staff always pass; otherwise the caller must be the patient or the doctor
/// of the appointment, as enabled by the flags.
fn authorize(
    user: &User,
    appointment: &Appointment,
    allow_patient: bool,
    allow_doctor: bool,
) -> Result<(), AppError> {
    if user.is_staff() {
        return Ok(());
    }
    if allow_patient && user.has_role(Role::Patient) && user.is_self(&appointment.patient_id) {
        return Ok(());
    }
    if allow_doctor && user.has_role(Role::Doctor) && user.is_self(&appointment.doctor_id) {
        return Ok(());
    }

    warn!(
        "User {} denied access to appointment {}",
        user.id, appointment.id
    );
    Err(AppError::Forbidden(
        "Not allowed to act on this appointment".to_string(),
    ))
}

fn authorize_status_change(
    user: &User,
    appointment: &Appointment,
    status: AppointmentStatus,
) -> Result<(), AppError> {
    let allow_patient = status == AppointmentStatus::Canceled;
    authorize(user, appointment, allow_patient, true)
}

// ==============================================================================
// HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let caller = user_uuid(&user)?;

    if !user.is_staff() {
        match user.role() {
            Some(Role::Patient) => {
                require_owner_or_role(&user, Role::Patient, request.patient_id, &[])?
            }
            Some(Role::Doctor) => {
                require_owner_or_role(&user, Role::Doctor, request.doctor_id, &[])?
            }
            _ => {
                return Err(AppError::Forbidden(
                    "Only patients, doctors and staff can book appointments".to_string(),
                ))
            }
        }
    }

    let appointment = state.booking().create(request, caller).await?;

    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking().get(appointment_id).await?;
    authorize(&user, &appointment, true, true)?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<AppointmentState>,
    Query(params): Query<AppointmentQueryParams>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let mut filter = AppointmentFilter::from(params);

    match user.role() {
        Some(Role::Admin) | Some(Role::Receptionist) => {}
        Some(Role::Patient) => filter.patient_id = Some(user_uuid(&user)?),
        Some(Role::Doctor) => filter.doctor_id = Some(user_uuid(&user)?),
        None => {
            return Err(AppError::Forbidden(
                "A recognised role is required to list appointments".to_string(),
            ))
        }
    }

    let appointments = state.booking().list(filter).await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn update_status(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let booking = state.booking();
    let appointment = booking.get(appointment_id).await?;
    authorize_status_change(&user, &appointment, request.status)?;

    let appointment = booking
        .set_status(appointment_id, request.status, None)
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleRequest>,
) -> Result<Json<Value>, AppError> {
    let booking = state.booking();
    let appointment = booking.get(appointment_id).await?;
    authorize(&user, &appointment, true, true)?;

    let appointment = booking
        .reschedule(appointment_id, request.new_date, request.reason)
        .await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn schedule_follow_up(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<FollowUpRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let booking = state.booking();
    let parent = booking.get(appointment_id).await?;
    authorize(&user, &parent, false, true)?;

    let follow_up = booking
        .schedule_follow_up(appointment_id, request.follow_up_date, request.reason)
        .await?;

    Ok((StatusCode::CREATED, Json(json!(follow_up))))
}

#[axum::debug_handler]
pub async fn confirm_by_patient(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let booking = state.booking();
    let appointment = booking.get(appointment_id).await?;
    require_owner_or_role(&user, Role::Patient, appointment.patient_id, &[])?;

    let appointment = booking.confirm_by_patient(appointment_id).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn send_confirmation(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let appointment = state.booking().send_confirmation(appointment_id).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn generate_bill(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let invoice = state.booking().generate_bill(appointment_id).await?;

    Ok(Json(json!(invoice)))
}
