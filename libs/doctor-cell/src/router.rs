use axum::{
    middleware,
    routing::{delete, get, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::models::DoctorState;

pub fn doctor_routes(state: DoctorState) -> Router {
    Router::new()
        .route(
            "/{doctor_id}/availability",
            get(handlers::list_rules).post(handlers::create_rule),
        )
        .route(
            "/{doctor_id}/availability/{rule_id}",
            put(handlers::update_rule).delete(handlers::delete_rule),
        )
        .route("/{doctor_id}/availability/check", get(handlers::check_availability))
        .route(
            "/{doctor_id}/days-off",
            get(handlers::list_days_off).post(handlers::create_day_off),
        )
        .route("/{doctor_id}/days-off/{day_off_id}", delete(handlers::delete_day_off))
        .route("/{doctor_id}/available-slots", get(handlers::get_available_slots))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
