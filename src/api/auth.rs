use axum::{
    Extension, Json,
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_sessions::Session;
use tracing::warn;

use super::types::MessageResponse;
use super::{ApiError, ApiResponse, AppState, client_ip};
use crate::db::{Role, User};
use crate::services::auth::safe_redirect;

const SESSION_USER_KEY: &str = "user_id";

/// The authenticated user, resolved freshly from the store on every request
/// so role and active-flag changes take effect on the next request.
#[derive(Clone)]
pub struct CurrentUser(pub User);

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Optional post-login redirect target, validated against open redirects.
    pub next: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub username: String,
    pub role: Role,
    pub redirect: String,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// Session authentication gate for every protected route.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<impl IntoResponse, ApiError> {
    let user_id: Option<i32> = session
        .get(SESSION_USER_KEY)
        .await
        .map_err(|e| ApiError::internal(format!("Session error: {e}")))?;

    let Some(user_id) = user_id else {
        return Err(ApiError::Unauthorized("Not authenticated".to_string()));
    };

    let user = state
        .store()
        .get_user(user_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load user: {e}")))?;

    match user {
        Some(user) if user.active => {
            tracing::Span::current().record("user_id", user.id);
            request.extensions_mut().insert(CurrentUser(user));
            Ok(next.run(request).await)
        }
        _ => Err(ApiError::Unauthorized("Not authenticated".to_string())),
    }
}

/// Guard called at the top of every admin handler.
pub fn require_admin(current: &CurrentUser) -> Result<(), ApiError> {
    if crate::services::auth::authorize(&current.0, Role::Admin) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "You do not have permission to access this resource".to_string(),
        ))
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login
/// Authenticate with username and password; on success binds the session and
/// returns the validated redirect target.
pub async fn login(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    peer: Option<Extension<ConnectInfo<SocketAddr>>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    if payload.username.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let user = state
        .auth()
        .authenticate(&payload.username, &payload.password)
        .await?;

    session
        .insert(SESSION_USER_KEY, user.id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;

    let ip = client_ip(&headers, peer.map(|Extension(ConnectInfo(addr))| addr));
    log_activity(&state, user.id, "login", Some("Successful login"), ip).await;

    Ok(Json(ApiResponse::success(LoginResponse {
        username: user.username,
        role: user.role,
        redirect: safe_redirect(payload.next.as_deref()),
    })))
}

/// POST /auth/logout
/// Invalidate the current session unconditionally.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    session: Session,
    headers: HeaderMap,
    peer: Option<Extension<ConnectInfo<SocketAddr>>>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let ip = client_ip(&headers, peer.map(|Extension(ConnectInfo(addr))| addr));
    log_activity(&state, current.0.id, "logout", Some("Session closed"), ip).await;

    let _ = session.flush().await;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Logged out".to_string(),
    })))
}

/// GET /auth/me
pub async fn get_current_user(
    Extension(current): Extension<CurrentUser>,
) -> Json<ApiResponse<User>> {
    Json(ApiResponse::success(current.0))
}

/// PUT /auth/password
/// Change the caller's own password; requires proof of the current one.
/// Part of the admin management surface, so the admin gate applies here too.
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    headers: HeaderMap,
    peer: Option<Extension<ConnectInfo<SocketAddr>>>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    require_admin(&current)?;

    if payload.current_password.is_empty()
        || payload.new_password.is_empty()
        || payload.confirm_password.is_empty()
    {
        return Err(ApiError::validation("All fields are required"));
    }

    if payload.new_password != payload.confirm_password {
        return Err(ApiError::validation("Passwords do not match"));
    }

    let min_len = state.config().security.min_password_length;
    if payload.new_password.len() < min_len {
        return Err(ApiError::validation(format!(
            "New password must be at least {min_len} characters"
        )));
    }

    let is_valid = state
        .auth()
        .verify_current_password(&current.0.username, &payload.current_password)
        .await?;

    if !is_valid {
        return Err(ApiError::validation("Current password is incorrect"));
    }

    state
        .store()
        .update_user_password(
            current.0.id,
            &payload.new_password,
            &state.config().security,
        )
        .await
        .map_err(|e| ApiError::internal(format!("Failed to update password: {e}")))?
        .ok_or_else(|| ApiError::user_not_found(current.0.id))?;

    let ip = client_ip(&headers, peer.map(|Extension(ConnectInfo(addr))| addr));
    log_activity(
        &state,
        current.0.id,
        "change_password",
        Some("Password changed"),
        ip,
    )
    .await;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Password updated successfully".to_string(),
    })))
}

// ============================================================================
// Helpers
// ============================================================================

/// Best-effort audit append: a logging failure after a successful action is
/// surfaced in the service log, not to the caller.
pub async fn log_activity(
    state: &AppState,
    user_id: i32,
    action: &str,
    details: Option<&str>,
    ip: Option<String>,
) {
    if let Err(e) = state
        .store()
        .log_activity(user_id, action, details.map(ToString::to_string), ip)
        .await
    {
        warn!("Failed to append audit entry {action} for user {user_id}: {e}");
    }
}
