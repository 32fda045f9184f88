use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;

use crate::api::handlers::{self, AppState};
use crate::store::traits::Store;

/// Every resource path, `$batch` included, goes through the fallback and is
/// routed by the convention chain rather than by axum.
pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        .fallback(handlers::dispatch::<S>)
        .layer(CorsLayer::permissive())
}
