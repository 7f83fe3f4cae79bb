pub mod health;
pub mod stream;

use crate::state::AppState;
use axum::{Router, routing::get};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::healthcheck))
        .route("/status", get(health::status))
        .route("/sessions/:id", get(health::session))
        .route("/ws/stream", get(stream::ws_handler))
}
