use axum::{
    Extension, Json,
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;

use super::auth::{CurrentUser, log_activity, require_admin};
use super::types::MessageResponse;
use super::{ApiError, ApiResponse, AppState, client_ip};
use crate::db::{Role, User};

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Deserialize)]
pub struct EditUserRequest {
    pub email: String,
    pub active: bool,
    pub role: Role,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub new_password: String,
    pub confirm_password: String,
}

/// GET /admin/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<ApiResponse<Vec<User>>>, ApiError> {
    require_admin(&current)?;

    let users = state
        .store()
        .list_users()
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list users: {e}")))?;

    Ok(Json(ApiResponse::success(users)))
}

/// POST /admin/users
/// Uniqueness of username and email is pre-checked here before persistence.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    headers: HeaderMap,
    peer: Option<Extension<ConnectInfo<SocketAddr>>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    require_admin(&current)?;

    if payload.username.is_empty() || payload.email.is_empty() {
        return Err(ApiError::validation("Username and email are required"));
    }

    let min_len = state.config().security.min_password_length;
    if payload.password.len() < min_len {
        return Err(ApiError::validation(format!(
            "Password must be at least {min_len} characters"
        )));
    }

    if state
        .store()
        .username_exists(&payload.username)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
    {
        return Err(ApiError::Conflict(
            "This username is already in use".to_string(),
        ));
    }

    if state
        .store()
        .email_exists(&payload.email)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
    {
        return Err(ApiError::Conflict(
            "This email is already registered".to_string(),
        ));
    }

    let user = state
        .store()
        .create_user(
            &payload.username,
            &payload.email,
            &payload.password,
            payload.role,
            &state.config().security,
        )
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create user: {e}")))?;

    let ip = client_ip(&headers, peer.map(|Extension(ConnectInfo(addr))| addr));
    log_activity(
        &state,
        current.0.id,
        "create_user",
        Some(&format!("User created: {}", user.username)),
        ip,
    )
    .await;

    Ok(Json(ApiResponse::success(user)))
}

/// PUT /admin/users/{id}
/// Only email, active flag and role are editable; username and password are not.
pub async fn edit_user(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i32>,
    headers: HeaderMap,
    peer: Option<Extension<ConnectInfo<SocketAddr>>>,
    Json(payload): Json<EditUserRequest>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    require_admin(&current)?;

    if payload.email.is_empty() {
        return Err(ApiError::validation("Email is required"));
    }

    let user = state
        .store()
        .update_user_profile(id, &payload.email, payload.active, payload.role)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to update user: {e}")))?
        .ok_or_else(|| ApiError::user_not_found(id))?;

    let ip = client_ip(&headers, peer.map(|Extension(ConnectInfo(addr))| addr));
    log_activity(
        &state,
        current.0.id,
        "edit_user",
        Some(&format!("User edited: {}", user.username)),
        ip,
    )
    .await;

    Ok(Json(ApiResponse::success(user)))
}

/// POST /admin/users/{id}/password
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i32>,
    headers: HeaderMap,
    peer: Option<Extension<ConnectInfo<SocketAddr>>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    require_admin(&current)?;

    if payload.new_password.is_empty() || payload.confirm_password.is_empty() {
        return Err(ApiError::validation("All fields are required"));
    }

    if payload.new_password != payload.confirm_password {
        return Err(ApiError::validation("Passwords do not match"));
    }

    let min_len = state.config().security.min_password_length;
    if payload.new_password.len() < min_len {
        return Err(ApiError::validation(format!(
            "Password must be at least {min_len} characters"
        )));
    }

    let user = state
        .store()
        .update_user_password(id, &payload.new_password, &state.config().security)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to reset password: {e}")))?
        .ok_or_else(|| ApiError::user_not_found(id))?;

    let ip = client_ip(&headers, peer.map(|Extension(ConnectInfo(addr))| addr));
    log_activity(
        &state,
        current.0.id,
        "change_user_password",
        Some(&format!("Password reset for user: {}", user.username)),
        ip,
    )
    .await;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: format!("Password updated successfully for {}", user.username),
    })))
}
