use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::ws;
use crate::state::AppState;
use std::sync::Arc;

/// Create the WebSocket router.
///
/// The session endpoint is unauthenticated: the server holds all upstream
/// credentials itself and the connection carries only ephemeral audio.
/// Deployment behind a reverse proxy is the place to add access control.
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ws/session", get(ws::ws_session_handler))
        .layer(TraceLayer::new_for_http())
}
