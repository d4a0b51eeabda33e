//! Status and capability routes.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::models::{CapabilitiesResponse, StatusResponse};
use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(read_status))
        .route("/capabilities", get(read_capabilities))
}

async fn read_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        up_time_seconds: state.start_time.elapsed().as_secs_f64().round() as u64,
    })
}

async fn read_capabilities(State(state): State<AppState>) -> Json<CapabilitiesResponse> {
    Json(CapabilitiesResponse {
        loaded_modules: state.manager.capabilities(),
    })
}
