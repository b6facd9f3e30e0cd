pub mod call;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(call::call_routes())
        .merge(health::health_routes())
        .with_state(state)
}
