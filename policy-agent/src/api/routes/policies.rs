//! Policy routes.

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    routing::{delete, post},
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::DetailResponse;
use crate::api::server::AppState;

/// The only accepted request body type.
pub const POLICY_CONTENT_TYPE: &str = "application/x-yaml";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/policies", post(create_policies))
        .route("/policies/{name}", delete(delete_policy))
}

/// Start the policies of a YAML document.
async fn create_policies(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<DetailResponse>)> {
    if !is_yaml(&headers) {
        return Err(ApiError::bad_request(format!(
            "invalid Content-Type. Only '{POLICY_CONTENT_TYPE}' is supported"
        )));
    }

    let request = state.manager.parse_policy(&body)?;
    let started = state.manager.start_policies(request)?;

    Ok((StatusCode::CREATED, Json(DetailResponse::started(&started))))
}

async fn delete_policy(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<DetailResponse>> {
    state.manager.delete_policy(&name)?;
    Ok(Json(DetailResponse::deleted(&name)))
}

fn is_yaml(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(POLICY_CONTENT_TYPE))
}
