// libs/appointment-cell/src/router.rs
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::models::AppointmentState;

pub fn appointment_routes(state: AppointmentState) -> Router {
    // All appointment operations require authentication
    let protected_routes = Router::new()
        .route("/", post(handlers::create_appointment))
        .route("/", get(handlers::list_appointments))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/status", put(handlers::update_status))
        .route("/{appointment_id}/reschedule", post(handlers::reschedule_appointment))
        .route("/{appointment_id}/follow-up", post(handlers::schedule_follow_up))
        .route("/{appointment_id}/confirm-by-patient", post(handlers::confirm_by_patient))
        .route("/{appointment_id}/send-confirmation", post(handlers::send_confirmation))
        .route("/{appointment_id}/bill", post(handlers::generate_bill))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
