//! Task model definitions

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::protocol::StartTaskRequest;

/// Opaque task identifier (random 128-bit), never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
    TimedOut,
}

impl TaskStatus {
    /// Check if the status is terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work awaiting a result from the design plugin
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub command: String,
    pub args: Value,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Present only after a terminal transition
    pub result: Option<Value>,
    started: Instant,
}

impl Task {
    /// Create a new pending task
    pub fn new(command: impl Into<String>, args: Value) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            command: command.into(),
            args,
            status: TaskStatus::default(),
            created_at: now,
            updated_at: now,
            result: None,
            started: Instant::now(),
        }
    }

    /// Time since creation
    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }

    /// Project to the shape sent over the wire
    pub fn to_request(&self) -> StartTaskRequest {
        StartTaskRequest {
            id: self.id,
            command: self.command.clone(),
            args: self.args.clone(),
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            command: self.command.clone(),
            age_ms: self.age().as_millis() as u64,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// What the original caller finally observes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub ok: bool,
    pub payload: Value,
}

impl TaskOutcome {
    pub fn success(payload: Value) -> Self {
        Self { ok: true, payload }
    }

    pub fn failure(payload: Value) -> Self {
        Self { ok: false, payload }
    }

    /// Completed maps to success; failed and timed out map to failure
    pub fn from_status(status: TaskStatus, payload: Value) -> Self {
        match status {
            TaskStatus::Completed => Self::success(payload),
            _ => Self::failure(payload),
        }
    }
}

/// Read-only view of an active task for observability
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub command: String,
    pub age_ms: u64,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}
