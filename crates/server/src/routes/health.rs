//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    version: String,
    connected: bool,
    healthy: bool,
    connection_count: usize,
    active_tasks: usize,
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let gateway = state.gateway();

    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connected: gateway.is_connected(),
        healthy: gateway.is_healthy(),
        connection_count: gateway.connection_count(),
        active_tasks: state.registry().active_count(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
