//! Health check endpoint: GET /api/health

use super::super::error::Result;
use super::super::state::AppState;
use axum::{extract::State, response::Json};
use serde::Serialize;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    version: String,
    live_instances: usize,
    open_stores: usize,
}

/// GET /api/health - Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        live_instances: state.router.live_instances(),
        open_stores: state.router.open_stores(),
    }))
}
