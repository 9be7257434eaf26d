//! Error types for the bridge core

use serde_json::{json, Value};
use thiserror::Error;

use crate::task::TaskId;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Not connected to the design plugin")]
    NotConnected,

    #[error("Failed to send command to the design plugin")]
    SendFailed,

    #[error("Request to the design plugin timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Task cancelled")]
    Cancelled,

    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("Task {0} was already resolved")]
    LateDuplicate(TaskId),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeError {
    /// Render this error as the `{error: ...}` payload handed back to callers.
    pub fn to_payload(&self) -> Value {
        json!({ "error": self.to_string() })
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_carries_display_text() {
        let payload = BridgeError::Timeout { millis: 50 }.to_payload();
        assert_eq!(
            payload["error"],
            "Request to the design plugin timed out after 50ms"
        );
    }

    #[test]
    fn test_task_errors_name_the_task() {
        let id = TaskId::new();
        assert_eq!(
            BridgeError::UnknownTask(id).to_string(),
            format!("Unknown task: {}", id)
        );
        assert_eq!(
            BridgeError::LateDuplicate(id).to_string(),
            format!("Task {} was already resolved", id)
        );
    }
}
