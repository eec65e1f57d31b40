use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use tracing::warn;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{Role, User};
use shared_models::error::AppError;

use crate::jwt::validate_token;

pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?;

    let auth_value = auth_header
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?;

    let user = validate_token(token, &config.supabase_jwt_secret).map_err(AppError::Auth)?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

pub async fn extract_user<B>(request: &Request<B>) -> Result<User, AppError> {
    request
        .extensions()
        .get::<User>()
        .cloned()
        .ok_or_else(|| AppError::Auth("User not found in request extensions".to_string()))
}

/// The caller's id as a UUID. Subjects that are not UUIDs cannot own
/// scheduling records.
pub fn user_uuid(user: &User) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.id)
        .map_err(|_| AppError::Auth(format!("Token subject '{}' is not a valid user id", user.id)))
}

pub fn require_role(user: &User, allowed: &[Role]) -> Result<(), AppError> {
    match user.role() {
        Some(role) if allowed.contains(&role) => Ok(()),
        role => {
            warn!("User {} with role {:?} denied, requires one of {:?}", user.id, role, allowed);
            Err(AppError::Forbidden(format!(
                "Requires one of: {}",
                allowed
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )))
        }
    }
}

pub fn require_staff(user: &User) -> Result<(), AppError> {
    require_role(user, &[Role::Admin, Role::Receptionist])
}

/// Passes when the caller is `owner_role` acting on their own record, or
/// holds one of `allowed`.
pub fn require_owner_or_role(
    user: &User,
    owner_role: Role,
    owner_id: Uuid,
    allowed: &[Role],
) -> Result<(), AppError> {
    if user.has_role(owner_role) && user.is_self(&owner_id) {
        return Ok(());
    }
    if user.role().map_or(false, |role| allowed.contains(&role)) {
        return Ok(());
    }
    warn!(
        "User {} denied: not the {} {} and not one of {:?}",
        user.id, owner_role, owner_id, allowed
    );
    Err(AppError::Forbidden(format!(
        "Only the {} concerned or staff may do this",
        owner_role
    )))
}
