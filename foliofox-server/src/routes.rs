//! Route table: one function assembling every handler against
//! `AppState`.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{downloads, indexers, search, websocket};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/search", post(search::search_handler))
        .route(
            "/downloads",
            post(downloads::submit_download_handler).get(downloads::list_downloads_handler),
        )
        .route("/downloads/{id}/cancel", post(downloads::cancel_download_handler))
        .route("/downloads/{id}/pause", post(downloads::pause_download_handler))
        .route("/downloads/{id}/resume", post(downloads::resume_download_handler))
        .route("/indexers", get(indexers::list_indexers_handler))
        .route("/indexers/{id}/health", get(indexers::indexer_health_handler))
        .route("/ws", get(websocket::websocket_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
