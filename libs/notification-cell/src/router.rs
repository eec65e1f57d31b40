use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::models::NotificationState;

pub fn notification_routes(state: NotificationState) -> Router {
    let protected_routes = Router::new()
        .route("/notifications", get(handlers::list_notifications))
        .route("/notifications/{notification_id}/read", put(handlers::mark_read))
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware));

    // The socket authenticates with its own query token.
    let socket_routes = Router::new().route("/ws/notifications", get(handlers::ws_notifications));

    Router::new()
        .merge(protected_routes)
        .merge(socket_routes)
        .with_state(state)
}
