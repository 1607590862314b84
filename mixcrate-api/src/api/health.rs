//! Liveness and identity endpoints

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: String,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    name: String,
    version: String,
}

/// GET /health - liveness probe
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /info - service identity
pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: state.settings.app_name.clone(),
        version: state.settings.version.clone(),
    })
}
