pub mod config;
pub mod error;
pub mod logging;
pub mod routes;
pub mod state;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use state::AppState;
use tower_http::cors::CorsLayer;

/// Headroom for multipart boundaries and part headers on top of the image.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn app(state: AppState) -> Router {
    let body_limit = state.service.config().codec.max_upload_bytes + MULTIPART_OVERHEAD;

    Router::new()
        .route("/health", get(routes::health))
        .route("/models", get(routes::models))
        .route("/load_model", post(routes::load_model))
        .route("/detect", post(routes::detect))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
