use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderMap, HeaderValue},
    middleware,
    routing::{get, post, put},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{Expiry, MemoryStore, SessionManagerLayer};

use crate::config::Config;
use crate::state::SharedState;

mod analyze;
pub mod auth;
mod error;
mod logs;
mod types;
mod upload;
mod users;

pub use error::ApiError;
pub use types::ApiResponse;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &crate::db::Store {
        &self.shared.store
    }

    #[must_use]
    pub fn auth(&self) -> &crate::services::AuthService {
        &self.shared.auth
    }

    #[must_use]
    pub fn dispatcher(&self) -> &crate::services::DispatchService {
        &self.shared.dispatcher
    }

    #[must_use]
    pub fn prober(&self) -> &crate::services::ProbeService {
        &self.shared.prober
    }
}

pub async fn create_app_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(Arc::new(AppState { shared }))
}

pub fn router(state: Arc<AppState>) -> Router {
    let (cors_origins, secure_cookies, expiry_minutes, max_upload_bytes) = {
        let config = state.config();
        (
            config.server.cors_allowed_origins.clone(),
            config.server.secure_cookies,
            config.server.session_expiry_minutes,
            config.server.max_upload_bytes,
        )
    };

    let protected_routes = create_protected_router(state.clone(), max_upload_bytes);

    let session_store = MemoryStore::default();
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(secure_cookies)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(
            expiry_minutes,
        )));

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/auth/login", post(auth::login))
        .layer(session_layer)
        .with_state(state);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

fn create_protected_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router<Arc<AppState>> {
    // The file intake routes carry their own body cap; everything else keeps
    // axum's small default.
    let file_routes = Router::new()
        .route("/upload", post(upload::dispatch_batch))
        .route("/analyze", post(analyze::analyze_file))
        .layer(DefaultBodyLimit::max(max_upload_bytes));

    Router::new()
        .merge(file_routes)
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::get_current_user))
        .route("/auth/password", put(auth::change_password))
        .route("/admin/users", get(users::list_users))
        .route("/admin/users", post(users::create_user))
        .route("/admin/users/{id}", put(users::edit_user))
        .route("/admin/users/{id}/password", post(users::reset_password))
        .route("/admin/logs", get(logs::list_logs))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

/// Origin address recorded in the audit trail: the forwarded client address
/// when a proxy supplies one, otherwise the socket peer.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next()
    {
        let first = first.trim();
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }

    peer.map(|addr| addr.ip().to_string())
}
