use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use super::ApiResponse;
use crate::services::{AuthError, DispatchError, ProbeError};

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),

    DatabaseError(String),

    ValidationError(String),

    Conflict(String),

    InternalError(String),

    Unauthorized(String),

    Forbidden(String),

    /// Fatal configuration fault: an external tool binary is missing.
    ToolNotFound(String),

    /// An external tool ran but failed; carries its diagnostic text.
    ToolFailed { tool: String, detail: String },
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "Not found: {msg}"),
            Self::DatabaseError(msg) => write!(f, "Database error: {msg}"),
            Self::ValidationError(msg) => write!(f, "Validation error: {msg}"),
            Self::Conflict(msg) => write!(f, "Conflict: {msg}"),
            Self::InternalError(msg) => write!(f, "Internal error: {msg}"),
            Self::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            Self::Forbidden(msg) => write!(f, "Forbidden: {msg}"),
            Self::ToolNotFound(msg) => write!(f, "Tool not found: {msg}"),
            Self::ToolFailed { tool, detail } => write!(f, "{tool} failed: {detail}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            Self::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal error occurred".to_string(),
                )
            }
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Self::ToolNotFound(msg) => {
                tracing::error!("External tool missing: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone())
            }
            Self::ToolFailed { tool, detail } => {
                tracing::warn!("{} failed: {}", tool, detail);
                (StatusCode::BAD_GATEWAY, format!("{tool} failed: {detail}"))
            }
        };

        let body = ApiResponse::<()>::error(error_message);
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalError(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::AccountDisabled => {
                Self::Unauthorized(err.to_string())
            }
            AuthError::Internal(e) => Self::InternalError(e.to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::NoFilesSelected => Self::ValidationError(err.to_string()),
            DispatchError::ToolNotFound(path) => {
                Self::ToolNotFound(format!("dcmsend not found at {}", path.display()))
            }
            DispatchError::TransferFailed { detail } => Self::ToolFailed {
                tool: "dcmsend".to_string(),
                detail,
            },
            DispatchError::Staging(e) => Self::InternalError(format!("Staging failed: {e}")),
        }
    }
}

impl From<ProbeError> for ApiError {
    fn from(err: ProbeError) -> Self {
        match err {
            ProbeError::ToolNotFound(path) => {
                Self::ToolNotFound(format!("dcmdump not found at {}", path.display()))
            }
            ProbeError::Timeout { .. } => Self::ToolFailed {
                tool: "dcmdump".to_string(),
                detail: err.to_string(),
            },
            ProbeError::Staging(e) => Self::InternalError(format!("Staging failed: {e}")),
        }
    }
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    #[must_use]
    pub fn user_not_found(id: i32) -> Self {
        Self::NotFound(format!("User {id} not found"))
    }
}
