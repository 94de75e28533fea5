pub mod handlers;
pub mod models;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::server::AppState;

/// Add-on surface (manifest and stream lookup) plus the `/api` helpers.
pub fn router(state: Arc<AppState>) -> Router {
  Router::new()
    .route("/manifest.json", get(handlers::manifest))
    .route("/stream/{kind}/{id}", get(handlers::stream))
    .route("/api/resolve", post(handlers::resolve_one))
    .route("/api/proxy", post(handlers::proxy))
    .route("/api/debug", post(handlers::debug_chain))
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
