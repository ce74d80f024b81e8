pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::coach::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Content (read paths, always answered)
        .route("/api/v1/quiz", get(handlers::handle_get_quiz))
        .route("/api/v1/plan", get(handlers::handle_get_plan))
        // Progress (optimistic writes)
        .route(
            "/api/v1/units/:unit_id/complete",
            post(handlers::handle_complete_unit),
        )
        .route("/api/v1/progress", get(handlers::handle_get_progress))
        // Sync
        .route("/api/v1/sync", get(handlers::handle_sync_status))
        .route("/api/v1/sync/flush", post(handlers::handle_flush))
        .with_state(state)
}
