// libs/waiting-queue-cell/src/handlers.rs
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use shared_database::QueueFilter;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;
use shared_utils::extractor::{require_owner_or_role, require_staff, user_uuid};

use crate::models::{
    CreateQueueEntryRequest, QueueQueryParams, ScheduleEntryRequest, UpdatePriorityRequest,
    WaitingQueueState,
};

#[axum::debug_handler]
pub async fn list_entries(
    State(state): State<WaitingQueueState>,
    Query(params): Query<QueueQueryParams>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let mut filter = QueueFilter::from(params);

    match user.role() {
        Some(Role::Admin) | Some(Role::Receptionist) => {}
        Some(Role::Patient) => filter.patient_id = Some(user_uuid(&user)?),
        Some(Role::Doctor) => filter.doctor_id = Some(user_uuid(&user)?),
        None => {
            return Err(AppError::Forbidden(
                "A recognised role is required to view the waiting queue".to_string(),
            ))
        }
    }

    let entries = state.queue().list(filter, Utc::now()).await?;

    Ok(Json(json!({
        "entries": entries,
        "total": entries.len()
    })))
}

#[axum::debug_handler]
pub async fn create_entry(
    State(state): State<WaitingQueueState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateQueueEntryRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_owner_or_role(
        &user,
        Role::Patient,
        request.patient_id,
        &[Role::Admin, Role::Receptionist],
    )?;

    let entry = state.queue().create(request).await?;

    Ok((StatusCode::CREATED, Json(json!(entry))))
}

#[axum::debug_handler]
pub async fn update_priority(
    State(state): State<WaitingQueueState>,
    Path(entry_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdatePriorityRequest>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let entry = state.queue().reprioritize(entry_id, request.priority).await?;

    Ok(Json(json!(entry)))
}

#[axum::debug_handler]
pub async fn remove_entry(
    State(state): State<WaitingQueueState>,
    Path(entry_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let queue = state.queue();
    let entry = queue.get(entry_id).await?;
    require_owner_or_role(
        &user,
        Role::Patient,
        entry.patient_id,
        &[Role::Admin, Role::Receptionist],
    )?;

    let entry = queue.remove(entry_id).await?;

    Ok(Json(json!(entry)))
}

#[axum::debug_handler]
pub async fn schedule_entry(
    State(state): State<WaitingQueueState>,
    Path(entry_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<ScheduleEntryRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    require_staff(&user)?;

    let (entry, appointment) = state
        .queue()
        .promote(entry_id, request.appointment_date, request.notes, Utc::now())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "appointment": appointment,
            "entry": entry
        })),
    ))
}

#[axum::debug_handler]
pub async fn expire_entries(
    State(state): State<WaitingQueueState>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    require_staff(&user)?;

    let expired = state.queue().expire_stale(Utc::now()).await?;

    Ok(Json(json!({
        "expired": expired,
        "count": expired.len()
    })))
}
