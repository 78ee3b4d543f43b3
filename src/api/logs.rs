use axum::{
    Extension, Json,
    extract::{Query, State},
};
use serde::Deserialize;
use std::sync::Arc;

use super::auth::{CurrentUser, require_admin};
use super::{ApiError, ApiResponse, AppState};
use crate::db::ActivityPage;

const PAGE_SIZE: u64 = 20;

#[derive(Deserialize)]
pub struct LogsQuery {
    /// Username substring filter.
    pub user: Option<String>,
    /// Details substring filter; combines conjunctively with `user`.
    pub details: Option<String>,
    pub page: Option<u64>,
}

/// GET /admin/logs
/// Paged audit trail, newest first.
pub async fn list_logs(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<ApiResponse<ActivityPage>>, ApiError> {
    require_admin(&current)?;

    let username_filter = query.user.as_deref().filter(|s| !s.is_empty());
    let details_filter = query.details.as_deref().filter(|s| !s.is_empty());

    let page = state
        .store()
        .list_activity(
            username_filter,
            details_filter,
            query.page.unwrap_or(1),
            PAGE_SIZE,
        )
        .await
        .map_err(|e| ApiError::internal(format!("Failed to list activity log: {e}")))?;

    Ok(Json(ApiResponse::success(page)))
}
