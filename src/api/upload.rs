use axum::{
    Extension, Json,
    extract::{ConnectInfo, Multipart, State},
    http::HeaderMap,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;

use super::auth::{CurrentUser, log_activity};
use super::{ApiError, ApiResponse, AppState, client_ip};

#[derive(Serialize)]
pub struct DispatchResponse {
    pub files_sent: usize,
    pub message: String,
}

/// POST /upload
/// Multipart batch intake: every `directory` part is staged and the whole
/// batch is handed to the transfer tool in one invocation.
pub async fn dispatch_batch(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    headers: HeaderMap,
    peer: Option<Extension<ConnectInfo<SocketAddr>>>,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<DispatchResponse>>, ApiError> {
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("Invalid multipart request: {e}")))?
    {
        if field.name() != Some("directory") {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content = field
            .bytes()
            .await
            .map_err(|e| ApiError::validation(format!("Failed to read upload: {e}")))?;

        files.push((filename, content.to_vec()));
    }

    let outcome = state.dispatcher().dispatch(&files).await?;

    let ip = client_ip(&headers, peer.map(|Extension(ConnectInfo(addr))| addr));
    log_activity(
        &state,
        current.0.id,
        "send_dicom",
        Some(&format!("Dispatched {} file(s)", outcome.files_sent)),
        ip,
    )
    .await;

    Ok(Json(ApiResponse::success(DispatchResponse {
        files_sent: outcome.files_sent,
        message: "Files sent successfully".to_string(),
    })))
}
