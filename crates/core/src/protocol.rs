//! Wire protocol between the bridge and the design plugin
//!
//! Messages are a tagged union. Over the plain WebSocket transport they travel
//! as JSON objects with a `type` field; event-based transports (Socket.IO) use
//! [`OutboundMessage::event_name`] as the event and the variant body as data.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::task::TaskId;

/// Event names used on the wire
pub mod events {
    pub const START_TASK: &str = "start-task";
    pub const TASK_FINISHED: &str = "task-finished";
    pub const TASK_FAILED: &str = "task-failed";
    pub const KEEP_ALIVE_PING: &str = "keep-alive-ping";
    pub const KEEP_ALIVE_PONG: &str = "keep-alive-pong";
    pub const HEARTBEAT_ACK: &str = "heartbeat-ack";
}

/// Wire-safe projection of a task: never carries the completion handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTaskRequest {
    pub id: TaskId,
    pub command: String,
    #[serde(default)]
    pub args: Value,
}

/// Completion or failure reported by the plugin. `content` is opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResultEvent {
    pub task_id: TaskId,
    #[serde(default)]
    pub content: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeepAlive {
    #[serde(default)]
    pub timestamp: u64,
}

impl KeepAlive {
    pub fn now() -> Self {
        Self {
            timestamp: now_millis(),
        }
    }
}

/// Bridge -> plugin messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "start-task")]
    StartTask(StartTaskRequest),
    #[serde(rename = "keep-alive-ping")]
    KeepAlivePing(KeepAlive),
}

impl OutboundMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::StartTask(_) => events::START_TASK,
            Self::KeepAlivePing(_) => events::KEEP_ALIVE_PING,
        }
    }

    /// Message body without the `type` tag
    pub fn payload(&self) -> serde_json::Result<Value> {
        match self {
            Self::StartTask(request) => serde_json::to_value(request),
            Self::KeepAlivePing(ping) => serde_json::to_value(ping),
        }
    }
}

/// Plugin -> bridge messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "task-finished")]
    TaskFinished(TaskResultEvent),
    #[serde(rename = "task-failed")]
    TaskFailed(TaskResultEvent),
    #[serde(rename = "keep-alive-pong")]
    KeepAlivePong(KeepAlive),
    #[serde(rename = "heartbeat-ack")]
    HeartbeatAck(KeepAlive),
}

impl InboundMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::TaskFinished(_) => events::TASK_FINISHED,
            Self::TaskFailed(_) => events::TASK_FAILED,
            Self::KeepAlivePong(_) => events::KEEP_ALIVE_PONG,
            Self::HeartbeatAck(_) => events::HEARTBEAT_ACK,
        }
    }
}

/// Milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_start_task_serialization() {
        let id = TaskId::new();
        let msg = OutboundMessage::StartTask(StartTaskRequest {
            id,
            command: "create_rectangle".to_string(),
            args: json!({ "width": 100 }),
        });

        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "start-task");
        assert_eq!(json["id"], id.to_string());
        assert_eq!(json["command"], "create_rectangle");
        assert_eq!(json["args"]["width"], 100);
    }

    #[test]
    fn test_outbound_payload_has_no_tag() {
        let msg = OutboundMessage::KeepAlivePing(KeepAlive { timestamp: 42 });
        assert_eq!(msg.event_name(), "keep-alive-ping");
        assert_eq!(msg.payload().unwrap(), json!({ "timestamp": 42 }));
    }

    #[test]
    fn test_task_finished_deserialization() {
        let id = TaskId::new();
        let raw = format!(
            r#"{{"type":"task-finished","taskId":"{}","content":{{"pong":true}}}}"#,
            id
        );
        let msg: InboundMessage = serde_json::from_str(&raw).unwrap();

        match msg {
            InboundMessage::TaskFinished(event) => {
                assert_eq!(event.task_id, id);
                assert_eq!(event.content, json!({ "pong": true }));
            }
            _ => panic!("Expected TaskFinished message"),
        }
    }

    #[test]
    fn test_task_failed_content_is_passed_through() {
        let id = TaskId::new();
        let raw = format!(
            r#"{{"type":"task-failed","taskId":"{}","content":"Node not found"}}"#,
            id
        );
        let msg: InboundMessage = serde_json::from_str(&raw).unwrap();
        assert_eq!(msg.event_name(), "task-failed");
        match msg {
            InboundMessage::TaskFailed(event) => assert_eq!(event.content, json!("Node not found")),
            _ => panic!("Expected TaskFailed message"),
        }
    }

    #[test]
    fn test_pong_without_timestamp() {
        let msg: InboundMessage = serde_json::from_str(r#"{"type":"keep-alive-pong"}"#).unwrap();
        assert_eq!(msg, InboundMessage::KeepAlivePong(KeepAlive { timestamp: 0 }));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serde_json::from_str::<InboundMessage>(r#"{"type":"join","channel":"x"}"#);
        assert!(result.is_err());
    }
}
