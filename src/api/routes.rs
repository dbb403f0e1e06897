use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::CorsConfig;
use crate::AppState;

// Entries are checked by `Config::validate`; anything unparsable here allows
// nothing rather than everything.
fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let origin = if cors.allows_any_origin() {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(cors.parsed_origins().unwrap_or_default())
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(cors.parsed_methods().unwrap_or_default())
        .allow_headers(cors.parsed_headers().unwrap_or_default())
}

/// Public and authenticated user-facing routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    let upload_limit = state.config.max_upload_size as usize;
    let cors = cors_layer(&state.config.cors);

    Router::new()
        // Files
        .route(
            "/private/v1/files/:id",
            get(handlers::get_file).delete(handlers::delete_file),
        )
        .route(
            "/private/v1/files/public/:uid",
            post(handlers::create_public_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/private/v1/files/private/:uid",
            post(handlers::create_private_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/private/v1/files/admin-only/:uid",
            post(handlers::create_admin_only_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/private/v1/files/profile-image",
            post(handlers::create_profile_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/private/v1/users/:uid", get(handlers::list_user_files))
        // Temporary-token routes
        .route(
            "/private/v1/limited/:id",
            get(handlers::get_limited_file).delete(handlers::delete_limited_file),
        )
        .route(
            "/private/v1/limited/private",
            post(handlers::create_limited_private_file).layer(DefaultBodyLimit::max(upload_limit)),
        )
        // Binary content
        .route("/private/v1/storage/bin/:id", get(handlers::get_private_binary))
        .route("/public/v1/storage/bin/:id", get(handlers::get_public_binary))
        // Internal
        .route("/files/build", get(handlers::build_info))
        .route("/_internal/health", get(handlers::health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Service-to-service routes, served on a separate listener.
pub fn create_rpc_router(state: Arc<AppState>) -> Router {
    // Base64 inflates payloads by a third
    let body_limit = (state.config.max_upload_size as usize).saturating_mul(4) / 3 + 1024;

    Router::new()
        .route("/rpc/files/get-file", post(handlers::rpc_get_file))
        .route("/rpc/files/user-has-files", post(handlers::rpc_user_has_files))
        .route(
            "/rpc/files/upload-file",
            post(handlers::rpc_upload_file).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/rpc/files/download-file", post(handlers::rpc_download_file))
        .route("/_internal/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
