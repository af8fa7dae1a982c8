use axum::{
    Router,
    routing::post,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{chat, tts};
use crate::state::AppState;
use std::sync::Arc;

pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/chat", post(chat::chat_handler))
        .route("/api/tts", post(tts::tts_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
