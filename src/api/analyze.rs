use axum::{
    Extension, Json,
    extract::{ConnectInfo, Multipart, State},
    http::HeaderMap,
};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use super::auth::{CurrentUser, log_activity};
use super::{ApiError, ApiResponse, AppState, client_ip};

/// POST /analyze
/// Probe a single uploaded file for the configured DICOM header fields.
pub async fn analyze_file(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    headers: HeaderMap,
    peer: Option<Extension<ConnectInfo<SocketAddr>>>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<BTreeMap<String, String>>>, ApiError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Invalid multipart request: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            continue;
        }

        let content = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation(format!("Failed to read upload: {e}")))?;

        upload = Some((filename, content.to_vec()));
        break;
    }

    let Some((filename, content)) = upload else {
        return Err(ApiError::validation("No file selected"));
    };

    let values = state.prober().probe(&filename, &content).await?;

    let ip = client_ip(&headers, peer.map(|Extension(ConnectInfo(addr))| addr));
    log_activity(
        &state,
        current.0.id,
        "analyze_dicom",
        Some(&format!("File analyzed: {filename}")),
        ip,
    )
    .await;

    Ok(Json(ApiResponse::success(values)))
}
