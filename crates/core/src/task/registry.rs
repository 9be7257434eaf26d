//! Task registry - owns in-flight tasks, their timers and their callers

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use super::history::{TaskHistory, DEFAULT_HISTORY_CAPACITY};
use super::model::{Task, TaskId, TaskOutcome, TaskSnapshot, TaskStatus};
use crate::error::BridgeError;
use crate::policy::TimeoutPolicy;

/// Subscriber notified synchronously for every new task
pub type TaskAddedHook = Arc<dyn Fn(&TaskRegistry, &Task) + Send + Sync>;

/// How an update request was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The caller was resolved by this update
    Resolved,
    /// The task is still tracked but already terminal
    AlreadyTerminal,
    /// The task was resolved earlier and is still in the history
    LateDuplicate,
    /// Never seen, or evicted from the history
    Unknown,
    /// A non-terminal status was supplied
    Ignored,
}

impl UpdateOutcome {
    /// Error describing why an update for `id` had no caller to resolve
    pub fn into_error(self, id: TaskId) -> Option<BridgeError> {
        match self {
            Self::LateDuplicate | Self::AlreadyTerminal => Some(BridgeError::LateDuplicate(id)),
            Self::Unknown => Some(BridgeError::UnknownTask(id)),
            Self::Resolved | Self::Ignored => None,
        }
    }
}

struct PendingTask {
    task: Task,
    responder: oneshot::Sender<TaskOutcome>,
    timer: Option<AbortHandle>,
}

struct RegistryState {
    active: HashMap<TaskId, PendingTask>,
    history: TaskHistory,
}

struct RegistryInner {
    policy: TimeoutPolicy,
    state: Mutex<RegistryState>,
    on_task_added: RwLock<Option<TaskAddedHook>>,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        for pending in self.state.get_mut().active.values_mut() {
            if let Some(timer) = pending.timer.take() {
                timer.abort();
            }
        }
    }
}

/// Registry of pending tasks
///
/// Cheap to clone; all clones share the same state. Every caller-facing
/// operation absorbs anomalies (unknown ids, double delivery) into logs.
#[derive(Clone)]
pub struct TaskRegistry {
    inner: Arc<RegistryInner>,
}

/// Non-owning reference to a [`TaskRegistry`]
#[derive(Clone)]
pub struct WeakTaskRegistry {
    inner: Weak<RegistryInner>,
}

impl WeakTaskRegistry {
    pub fn upgrade(&self) -> Option<TaskRegistry> {
        self.inner.upgrade().map(|inner| TaskRegistry { inner })
    }
}

impl TaskRegistry {
    /// Create a registry with the default history capacity
    pub fn new(policy: TimeoutPolicy) -> Self {
        Self::with_history_capacity(policy, DEFAULT_HISTORY_CAPACITY)
    }

    pub fn with_history_capacity(policy: TimeoutPolicy, capacity: usize) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                policy,
                state: Mutex::new(RegistryState {
                    active: HashMap::new(),
                    history: TaskHistory::new(capacity),
                }),
                on_task_added: RwLock::new(None),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakTaskRegistry {
        WeakTaskRegistry {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn policy(&self) -> &TimeoutPolicy {
        &self.inner.policy
    }

    /// Register the task-added subscriber, replacing any previous one
    pub fn on_task_added<F>(&self, hook: F)
    where
        F: Fn(&TaskRegistry, &Task) + Send + Sync + 'static,
    {
        *self.inner.on_task_added.write() = Some(Arc::new(hook));
    }

    /// Create a pending task and return the handle its caller awaits.
    ///
    /// Must be called from within a Tokio runtime: the timeout timer is a
    /// spawned task.
    pub fn create_task(
        &self,
        command: impl Into<String>,
        args: Value,
        timeout: Option<Duration>,
    ) -> TaskHandle {
        let mut task = Task::new(command, args);
        let timeout = self.inner.policy.resolve(&task.command, timeout);
        let (responder, rx) = oneshot::channel();

        {
            let mut state = self.inner.state.lock();
            while state.active.contains_key(&task.id) || state.history.contains(&task.id) {
                error!("Task id collision on {}, generating a new id", task.id);
                task.id = TaskId::new();
            }

            // Armed under the lock so the timer cannot observe a missing task.
            let timer = arm_timeout(self.downgrade(), task.id, timeout);
            state.active.insert(
                task.id,
                PendingTask {
                    task: task.clone(),
                    responder,
                    timer: Some(timer),
                },
            );
        }

        debug!(
            task_id = %task.id,
            command = %task.command,
            timeout_ms = timeout.as_millis() as u64,
            "Task created"
        );

        let hook = self.inner.on_task_added.read().clone();
        if let Some(hook) = hook {
            hook(self, &task);
        }

        TaskHandle { id: task.id, rx }
    }

    /// Apply a terminal status to a task and resolve its caller.
    ///
    /// Idempotent: only the first terminal update for an id has any effect.
    pub fn update_task(&self, id: TaskId, payload: Value, status: TaskStatus) -> UpdateOutcome {
        if !status.is_terminal() {
            warn!("Ignoring update of task {} to non-terminal status {}", id, status);
            return UpdateOutcome::Ignored;
        }

        let mut state = self.inner.state.lock();
        let Some(mut pending) = state.active.remove(&id) else {
            return match state.history.find(&id) {
                Some(previous) => {
                    debug!(
                        "Ignoring {} update: {} as {}",
                        status,
                        BridgeError::LateDuplicate(id),
                        previous
                    );
                    UpdateOutcome::LateDuplicate
                }
                None => {
                    warn!("Ignoring {} update: {}", status, BridgeError::UnknownTask(id));
                    UpdateOutcome::Unknown
                }
            };
        };

        if pending.task.status.is_terminal() {
            debug!("Task {} is already {}, ignoring {}", id, pending.task.status, status);
            state.active.insert(id, pending);
            return UpdateOutcome::AlreadyTerminal;
        }

        pending.task.status = status;
        pending.task.updated_at = Utc::now();
        pending.task.result = Some(payload.clone());
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        state.history.record(id, status);
        drop(state);

        info!(
            task_id = %id,
            command = %pending.task.command,
            status = %status,
            elapsed_ms = pending.task.age().as_millis() as u64,
            "Task resolved"
        );

        if pending
            .responder
            .send(TaskOutcome::from_status(status, payload))
            .is_err()
        {
            debug!("Caller for task {} stopped waiting", id);
        }

        UpdateOutcome::Resolved
    }

    /// Resolve a pending task as failed on behalf of its caller
    pub fn cancel_task(&self, id: TaskId) -> UpdateOutcome {
        self.update_task(id, BridgeError::Cancelled.to_payload(), TaskStatus::Failed)
    }

    pub fn active_count(&self) -> usize {
        self.inner.state.lock().active.len()
    }

    pub fn is_pending(&self, id: &TaskId) -> bool {
        self.inner.state.lock().active.contains_key(id)
    }

    /// Final status of a recently resolved task, if still remembered
    pub fn resolved_status(&self, id: &TaskId) -> Option<TaskStatus> {
        self.inner.state.lock().history.find(id)
    }

    /// Snapshot of active tasks, oldest first
    pub fn snapshot(&self) -> Vec<TaskSnapshot> {
        let state = self.inner.state.lock();
        let mut tasks: Vec<TaskSnapshot> = state
            .active
            .values()
            .map(|pending| pending.task.snapshot())
            .collect();
        tasks.sort_by_key(|task| task.created_at);
        tasks
    }
}

fn arm_timeout(registry: WeakTaskRegistry, id: TaskId, timeout: Duration) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep(timeout).await;
        if let Some(registry) = registry.upgrade() {
            let millis = timeout.as_millis() as u64;
            registry.update_task(
                id,
                BridgeError::Timeout { millis }.to_payload(),
                TaskStatus::TimedOut,
            );
        }
    })
    .abort_handle()
}

/// Future resolving to the outcome of one task
#[derive(Debug)]
pub struct TaskHandle {
    id: TaskId,
    rx: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub fn id(&self) -> TaskId {
        self.id
    }
}

impl Future for TaskHandle {
    type Output = TaskOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(TaskOutcome::failure(json!({
                "error": format!("Task {} was dropped before it resolved", id)
            }))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn registry() -> TaskRegistry {
        TaskRegistry::new(TimeoutPolicy::uniform(5_000))
    }

    async fn settle(handle: TaskHandle) -> TaskOutcome {
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("task did not resolve")
    }

    #[tokio::test]
    async fn test_completed_task_resolves_ok() {
        let registry = registry();
        let handle = registry.create_task("get_selection", json!({}), None);
        let id = handle.id();
        assert_eq!(registry.active_count(), 1);

        let outcome = registry.update_task(id, json!({ "nodes": [] }), TaskStatus::Completed);
        assert_eq!(outcome, UpdateOutcome::Resolved);

        let result = settle(handle).await;
        assert_eq!(result, TaskOutcome::success(json!({ "nodes": [] })));
        assert_eq!(registry.active_count(), 0);
        assert_eq!(registry.resolved_status(&id), Some(TaskStatus::Completed));
    }

    #[tokio::test]
    async fn test_at_most_once_resolution() {
        let registry = registry();
        let handle = registry.create_task("create_text", json!({}), None);
        let id = handle.id();

        let first = registry.update_task(id, json!("done"), TaskStatus::Completed);
        let second = registry.update_task(id, json!("boom"), TaskStatus::Failed);

        assert_eq!(first, UpdateOutcome::Resolved);
        assert_eq!(second, UpdateOutcome::LateDuplicate);
        assert_eq!(settle(handle).await, TaskOutcome::success(json!("done")));
        assert_eq!(registry.resolved_status(&id), Some(TaskStatus::Completed));
    }

    #[tokio::test]
    async fn test_failed_task_resolves_error() {
        let registry = registry();
        let handle = registry.create_task("delete_node", json!({ "nodeId": "1:1" }), None);
        let id = handle.id();

        registry.update_task(id, json!("Node not found"), TaskStatus::Failed);
        let result = settle(handle).await;
        assert!(!result.ok);
        assert_eq!(result.payload, json!("Node not found"));
    }

    #[tokio::test]
    async fn test_timeout_fires() {
        let registry = registry();
        let started = Instant::now();
        let handle = registry.create_task("slow", json!({}), Some(Duration::from_millis(50)));
        let id = handle.id();

        let result = settle(handle).await;
        let elapsed = started.elapsed();

        assert!(!result.ok);
        assert!(result.payload["error"]
            .as_str()
            .unwrap()
            .contains("timed out after 50ms"));
        assert!(elapsed >= Duration::from_millis(45));
        assert!(elapsed < Duration::from_millis(500));
        assert!(!registry.is_pending(&id));
        assert_eq!(registry.resolved_status(&id), Some(TaskStatus::TimedOut));
    }

    #[tokio::test]
    async fn test_late_result_after_timeout_is_ignored() {
        let registry = registry();
        let handle = registry.create_task("slow", json!({}), Some(Duration::from_millis(30)));
        let id = handle.id();

        let result = settle(handle).await;
        assert!(!result.ok);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let late = registry.update_task(id, json!({ "late": true }), TaskStatus::Completed);
        assert_eq!(late, UpdateOutcome::LateDuplicate);
        assert_eq!(registry.resolved_status(&id), Some(TaskStatus::TimedOut));
    }

    #[tokio::test]
    async fn test_command_specific_timeout() {
        let policy = TimeoutPolicy::uniform(5_000).with_override("scan_text_nodes", 80);
        let registry = TaskRegistry::new(policy);
        let started = Instant::now();

        let handle = registry.create_task("scan_text_nodes", json!({}), None);
        let result = settle(handle).await;
        let elapsed = started.elapsed();

        assert!(!result.ok);
        assert!(result.payload["error"]
            .as_str()
            .unwrap()
            .contains("80ms"));
        assert!(elapsed >= Duration::from_millis(75));
        assert!(elapsed < Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_completion_cancels_timer() {
        let registry = registry();
        let handle = registry.create_task("quick", json!({}), Some(Duration::from_millis(20)));
        let id = handle.id();
        registry.update_task(id, json!(1), TaskStatus::Completed);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(settle(handle).await, TaskOutcome::success(json!(1)));
        assert_eq!(registry.resolved_status(&id), Some(TaskStatus::Completed));
    }

    #[tokio::test]
    async fn test_history_eviction() {
        let registry = TaskRegistry::with_history_capacity(TimeoutPolicy::uniform(5_000), 50);
        let mut ids = Vec::new();
        for i in 0..51 {
            let handle = registry.create_task("create_rectangle", json!({ "i": i }), None);
            ids.push(handle.id());
            registry.update_task(handle.id(), json!(i), TaskStatus::Completed);
        }

        assert_eq!(
            registry.update_task(ids[0], json!("late"), TaskStatus::Completed),
            UpdateOutcome::Unknown
        );
        assert_eq!(
            registry.update_task(ids[50], json!("late"), TaskStatus::Completed),
            UpdateOutcome::LateDuplicate
        );
    }

    #[tokio::test]
    async fn test_unknown_task_update() {
        let registry = registry();
        let outcome = registry.update_task(TaskId::new(), json!({}), TaskStatus::Completed);
        assert_eq!(outcome, UpdateOutcome::Unknown);
    }

    #[tokio::test]
    async fn test_pending_status_is_ignored() {
        let registry = registry();
        let handle = registry.create_task("noop", json!({}), None);

        let outcome = registry.update_task(handle.id(), json!({}), TaskStatus::Pending);
        assert_eq!(outcome, UpdateOutcome::Ignored);
        assert!(registry.is_pending(&handle.id()));
    }

    #[tokio::test]
    async fn test_snapshot_does_not_mutate() {
        let registry = registry();
        let first = registry.create_task("a", json!({}), None);
        let _second = registry.create_task("b", json!({}), None);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().any(|t| t.id == first.id()));
        assert!(snapshot.iter().all(|t| t.status == TaskStatus::Pending));
        assert_eq!(registry.active_count(), 2);
    }

    #[tokio::test]
    async fn test_task_added_hook_runs_synchronously() {
        let registry = registry();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        registry.on_task_added(move |_, task| {
            assert_eq!(task.command, "get_styles");
            assert_eq!(task.status, TaskStatus::Pending);
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        let _handle = registry.create_task("get_styles", json!({}), None);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hook_can_fail_task_immediately() {
        let registry = registry();
        registry.on_task_added(|registry, task| {
            registry.update_task(task.id, json!({ "error": "rejected" }), TaskStatus::Failed);
        });

        let handle = registry.create_task("anything", json!({}), None);
        assert_eq!(registry.active_count(), 0);
        let result = settle(handle).await;
        assert_eq!(result, TaskOutcome::failure(json!({ "error": "rejected" })));
    }

    #[tokio::test]
    async fn test_cancel_task() {
        let registry = registry();
        let handle = registry.create_task("export_node_as_image", json!({}), None);
        let id = handle.id();

        assert_eq!(registry.cancel_task(id), UpdateOutcome::Resolved);
        assert_eq!(registry.cancel_task(id), UpdateOutcome::LateDuplicate);

        let result = settle(handle).await;
        assert!(!result.ok);
        assert_eq!(result.payload["error"], "Task cancelled");
    }

    #[tokio::test]
    async fn test_update_outcome_errors() {
        let registry = registry();
        let handle = registry.create_task("get_styles", json!({}), None);
        let id = handle.id();
        registry.update_task(id, json!({}), TaskStatus::Completed);

        let late = registry.update_task(id, json!({}), TaskStatus::Failed);
        assert!(matches!(late.into_error(id), Some(BridgeError::LateDuplicate(e)) if e == id));

        let stranger = TaskId::new();
        let unknown = registry.update_task(stranger, json!({}), TaskStatus::Completed);
        assert!(matches!(unknown.into_error(stranger), Some(BridgeError::UnknownTask(e)) if e == stranger));

        assert!(UpdateOutcome::Resolved.into_error(id).is_none());
    }

    #[tokio::test]
    async fn test_dropped_registry_fails_pending_callers() {
        let registry = registry();
        let handle = registry.create_task("orphan", json!({}), None);
        drop(registry);

        let result = settle(handle).await;
        assert!(!result.ok);
    }
}
