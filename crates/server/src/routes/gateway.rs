//! Plugin link routes

use axum::{extract::State, routing::get, Json, Router};

use bridge_core::GatewayHealth;

use crate::gateway::plugin_ws_handler;
use crate::state::AppState;

/// GET /api/connection - Gateway health snapshot
async fn connection_status(State(state): State<AppState>) -> Json<GatewayHealth> {
    Json(state.gateway().health())
}

/// Create router for plugin link endpoints
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/plugin/ws", get(plugin_ws_handler))
        .route("/api/connection", get(connection_status))
}
