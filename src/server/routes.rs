//! Router configuration for the web server.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;

/// Slack on top of the encoded payload for the JSON envelope.
const ENVELOPE_BYTES: usize = 64 * 1024;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let body_limit = body_limit(state.gateway.config().max_file_size);

    Router::new()
        .route("/", get(handlers::health))
        // Conversion
        .route("/convert/path", post(handlers::convert_path))
        .route("/convert/content", post(handlers::convert_content))
        // Service information
        .route("/formats", get(handlers::list_formats))
        .route("/info", get(handlers::service_info))
        // Maintenance
        .route("/admin/sweep", post(handlers::sweep))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Request body ceiling for a given file size limit. Base64 inflates by 4/3;
/// the body must fit the largest accepted file.
fn body_limit(max_file_size: u64) -> usize {
    let max_file = usize::try_from(max_file_size).unwrap_or(usize::MAX);
    (max_file / 3)
        .saturating_mul(4)
        .saturating_add(4)
        .saturating_add(ENVELOPE_BYTES)
}
