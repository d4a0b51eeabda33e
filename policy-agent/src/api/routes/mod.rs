//! API route modules.

pub mod policies;
pub mod status;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    let v1 = Router::new()
        .merge(policies::router())
        .merge(status::router());

    Router::new().nest("/api/v1", v1).with_state(state)
}
