use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Extension, Path, Query, State,
    },
    response::IntoResponse,
    Json,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::user_uuid;
use shared_utils::jwt::validate_token;

use crate::models::{ListQuery, NotificationState, WsAuthQuery};
use crate::services::NotificationHub;

#[axum::debug_handler]
pub async fn list_notifications(
    State(state): State<NotificationState>,
    Extension(user): Extension<User>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, AppError> {
    let user_id = user_uuid(&user)?;
    let notifications = state.dispatcher().list(user_id, query.unread_only).await?;

    Ok(Json(json!({
        "notifications": notifications,
        "total": notifications.len()
    })))
}

#[axum::debug_handler]
pub async fn mark_read(
    State(state): State<NotificationState>,
    Extension(user): Extension<User>,
    Path(notification_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let user_id = user_uuid(&user)?;
    let notification = state.dispatcher().mark_read(notification_id, user_id).await?;
    Ok(Json(json!(notification)))
}

/// Browsers cannot set headers on a websocket handshake, so the token
/// travels in the query string.
pub async fn ws_notifications(
    ws: WebSocketUpgrade,
    State(state): State<NotificationState>,
    Query(query): Query<WsAuthQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user = validate_token(&query.token, &state.config.supabase_jwt_secret).map_err(AppError::Auth)?;
    let user_id = user_uuid(&user)?;

    info!("Notification socket accepted for user {}", user_id);
    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, hub, user_id)))
}

async fn handle_socket(socket: WebSocket, hub: NotificationHub, user_id: Uuid) {
    let (mut sink, mut stream) = socket.split();
    let mut room = hub.subscribe(user_id).await;

    loop {
        tokio::select! {
            pushed = room.recv() => match pushed {
                Ok(frame) => {
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Notification socket of user {} skipped {} message(s)", user_id, skipped);
                }
                Err(RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    drop(room);
    hub.leave(user_id).await;
    debug!("Notification socket closed for user {}", user_id);
}
