//! Route definitions

use axum::routing::get;
use axum::Router;

use super::handlers;
use super::server::AppState;

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/configs", get(handlers::get_configs))
        .route("/health", get(handlers::health_check))
        .with_state(state)
}
