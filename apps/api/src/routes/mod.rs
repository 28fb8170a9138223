pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::enrichment::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/categories", get(handlers::handle_list_categories))
        .route("/api/v1/requests/process", post(handlers::handle_process))
        .with_state(state)
}
