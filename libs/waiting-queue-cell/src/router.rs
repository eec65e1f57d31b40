use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::models::WaitingQueueState;

pub fn waiting_queue_routes(state: WaitingQueueState) -> Router {
    let protected_routes = Router::new()
        .route("/", get(handlers::list_entries).post(handlers::create_entry))
        .route("/expire", post(handlers::expire_entries))
        .route(
            "/{entry_id}",
            put(handlers::update_priority).delete(handlers::remove_entry),
        )
        .route("/{entry_id}/schedule", post(handlers::schedule_entry))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
