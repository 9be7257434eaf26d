//! Task API endpoints
//!
//! Invoke plugin commands over HTTP and inspect or cancel pending work.

use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use bridge_core::task::TaskSnapshot;
use bridge_core::{TaskId, TaskOutcome, UpdateOutcome};

use super::ErrorResponse;
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRequest {
    pub command: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Give a plugin this long to link in before failing fast
    #[serde(default)]
    pub wait_for_connection_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

/// Tool-layer result shape
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub is_error: bool,
    pub content: Vec<ContentBlock>,
}

impl From<TaskOutcome> for ToolResponse {
    fn from(outcome: TaskOutcome) -> Self {
        let text = match outcome.payload {
            Value::String(text) => text,
            other => other.to_string(),
        };
        Self {
            is_error: !outcome.ok,
            content: vec![ContentBlock { kind: "text", text }],
        }
    }
}

type ApiError = (StatusCode, Json<ErrorResponse>);

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/tasks - Active tasks, oldest first
async fn list_tasks(State(state): State<AppState>) -> Json<Vec<TaskSnapshot>> {
    Json(state.registry().snapshot())
}

/// POST /api/tasks - Run a command on the plugin and wait for its result
async fn invoke_task(
    State(state): State<AppState>,
    Json(req): Json<InvokeRequest>,
) -> Result<Json<ToolResponse>, ApiError> {
    if req.command.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Command cannot be empty")),
        ));
    }
    if req.timeout_ms == Some(0) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("timeoutMs must be positive")),
        ));
    }

    if let Some(wait_ms) = req.wait_for_connection_ms {
        let connected = state
            .gateway()
            .wait_for_connection(Duration::from_millis(wait_ms))
            .await;
        debug!(connected, wait_ms, "Waited for plugin link");
    }

    let handle = state.registry().create_task(
        req.command.trim(),
        req.args,
        req.timeout_ms.map(Duration::from_millis),
    );
    let outcome = handle.await;

    Ok(Json(ToolResponse::from(outcome)))
}

/// DELETE /api/tasks/{id} - Cancel a pending task
async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: TaskId = id.parse().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(format!("Invalid task id: {}", id))),
        )
    })?;

    match state.registry().cancel_task(id) {
        UpdateOutcome::Resolved => {
            info!("Task {} cancelled over HTTP", id);
            Ok(StatusCode::NO_CONTENT)
        }
        outcome => {
            let error = outcome
                .into_error(id)
                .map_or_else(|| format!("Task {} is not pending", id), |e| e.to_string());
            Err((StatusCode::NOT_FOUND, Json(ErrorResponse::new(error))))
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(invoke_task))
        .route("/api/tasks/{id}", delete(cancel_task))
}
