//! Connection gateway - tracks links to the design plugin and routes traffic

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::protocol::{InboundMessage, OutboundMessage, TaskResultEvent};

/// A connection counts as unhealthy after this long without inbound traffic
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(120);

/// Callback receiving task completion or failure events
pub type TaskEventHook = Arc<dyn Fn(TaskResultEvent) + Send + Sync>;

/// Identifier of one physical link
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct LinkId(String);

impl LinkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random id for transports that don't name their connections
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

struct Link {
    tx: mpsc::Sender<OutboundMessage>,
    connected_at: Instant,
    last_activity: Instant,
}

struct GatewayState {
    links: HashMap<LinkId, Link>,
    waiters: Vec<oneshot::Sender<()>>,
    last_heartbeat: Option<Instant>,
    last_activity: Option<Instant>,
}

/// Per-link view in [`GatewayHealth`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkHealth {
    pub link_id: LinkId,
    pub connected_for_ms: u64,
    pub idle_ms: u64,
}

/// Derived liveness view. `connected` and `healthy` are distinct signals:
/// a link can be up while no traffic has arrived for a long time.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayHealth {
    pub connected: bool,
    pub healthy: bool,
    pub connection_count: usize,
    pub last_heartbeat_ago_ms: Option<u64>,
    pub last_activity_ago_ms: Option<u64>,
    pub stale_after_ms: u64,
    pub links: Vec<LinkHealth>,
}

/// Gateway - the single logical channel to the design plugin
///
/// Any number of physical links may be attached at once (several plugin
/// windows); the logical connection is up iff at least one is.
pub struct ConnectionGateway {
    state: Mutex<GatewayState>,
    stale_after: Duration,
    on_task_finished: RwLock<Option<TaskEventHook>>,
    on_task_error: RwLock<Option<TaskEventHook>>,
}

impl ConnectionGateway {
    pub fn new() -> Self {
        Self::with_stale_after(DEFAULT_STALE_AFTER)
    }

    pub fn with_stale_after(stale_after: Duration) -> Self {
        Self {
            state: Mutex::new(GatewayState {
                links: HashMap::new(),
                waiters: Vec::new(),
                last_heartbeat: None,
                last_activity: None,
            }),
            stale_after,
            on_task_finished: RwLock::new(None),
            on_task_error: RwLock::new(None),
        }
    }

    /// Register the task-finished callback, replacing any previous one
    pub fn on_task_finished<F>(&self, hook: F)
    where
        F: Fn(TaskResultEvent) + Send + Sync + 'static,
    {
        *self.on_task_finished.write() = Some(Arc::new(hook));
    }

    /// Register the task-failed callback, replacing any previous one
    pub fn on_task_error<F>(&self, hook: F)
    where
        F: Fn(TaskResultEvent) + Send + Sync + 'static,
    {
        *self.on_task_error.write() = Some(Arc::new(hook));
    }

    /// Attach a physical link. Returns the number of live links afterwards.
    pub fn add_link(&self, id: LinkId, tx: mpsc::Sender<OutboundMessage>) -> usize {
        let mut state = self.state.lock();
        let now = Instant::now();
        let was_connected = !state.links.is_empty();

        if state.links.contains_key(&id) {
            warn!("Link {} already registered, replacing it", id);
        }
        state.links.insert(
            id.clone(),
            Link {
                tx,
                connected_at: now,
                last_activity: now,
            },
        );
        state.last_heartbeat = Some(now);

        for waiter in state.waiters.drain(..) {
            let _ = waiter.send(());
        }

        let count = state.links.len();
        if was_connected {
            info!("Link {} connected ({} active)", id, count);
        } else {
            info!("Design plugin connected via link {}", id);
        }
        count
    }

    /// Detach a physical link. Removing an unknown link is a no-op.
    pub fn remove_link(&self, id: &LinkId) -> bool {
        let mut state = self.state.lock();
        if state.links.remove(id).is_none() {
            debug!("Ignoring disconnect of unknown link {}", id);
            return false;
        }

        if state.links.is_empty() {
            info!("Link {} disconnected, design plugin is no longer connected", id);
        } else {
            info!("Link {} disconnected ({} still active)", id, state.links.len());
        }
        true
    }

    pub fn is_connected(&self) -> bool {
        !self.state.lock().links.is_empty()
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().links.len()
    }

    /// Broadcast a message to every live link.
    ///
    /// Returns false without side effects when nothing is connected, and
    /// false when no link accepted the message. Nothing is queued for later.
    pub fn send(&self, message: OutboundMessage) -> bool {
        let mut state = self.state.lock();
        if state.links.is_empty() {
            debug!("Not connected, dropping {}", message.event_name());
            return false;
        }

        let now = Instant::now();
        let mut delivered = 0;
        for (id, link) in state.links.iter_mut() {
            match link.tx.try_send(message.clone()) {
                Ok(()) => {
                    link.last_activity = now;
                    delivered += 1;
                }
                Err(TrySendError::Full(_)) => {
                    warn!("Outbound queue for link {} is full, dropping {}", id, message.event_name());
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("Link {} is closed, dropping {}", id, message.event_name());
                }
            }
        }

        if delivered > 0 {
            state.last_activity = Some(now);
        }
        delivered > 0
    }

    /// Wait until at least one link is up, or the timeout elapses
    pub async fn wait_for_connection(&self, timeout: Duration) -> bool {
        let rx = {
            let mut state = self.state.lock();
            if !state.links.is_empty() {
                return true;
            }
            state.waiters.retain(|waiter| !waiter.is_closed());
            let (tx, rx) = oneshot::channel();
            state.waiters.push(tx);
            rx
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => false,
            Err(_) => {
                debug!("No connection within {}ms", timeout.as_millis());
                false
            }
        }
    }

    /// Record inbound traffic of any kind on a link
    pub fn touch(&self, id: &LinkId) {
        let mut state = self.state.lock();
        let now = Instant::now();
        state.last_heartbeat = Some(now);
        state.last_activity = Some(now);
        if let Some(link) = state.links.get_mut(id) {
            link.last_activity = now;
        }
    }

    /// Route one inbound message. Task content is passed through untouched.
    pub fn handle_inbound(&self, link: &LinkId, message: InboundMessage) {
        self.touch(link);

        match message {
            InboundMessage::TaskFinished(event) => {
                let hook = self.on_task_finished.read().clone();
                match hook {
                    Some(hook) => hook(event),
                    None => warn!("No task-finished handler, dropping result for {}", event.task_id),
                }
            }
            InboundMessage::TaskFailed(event) => {
                let hook = self.on_task_error.read().clone();
                match hook {
                    Some(hook) => hook(event),
                    None => warn!("No task-failed handler, dropping error for {}", event.task_id),
                }
            }
            InboundMessage::KeepAlivePong(_) | InboundMessage::HeartbeatAck(_) => {
                debug!("Keep-alive acknowledged by link {}", link);
            }
        }
    }

    /// Connected and heard from within the staleness threshold
    pub fn is_healthy(&self) -> bool {
        let state = self.state.lock();
        !state.links.is_empty()
            && state
                .last_heartbeat
                .is_some_and(|at| at.elapsed() < self.stale_after)
    }

    pub fn health(&self) -> GatewayHealth {
        let state = self.state.lock();
        let connected = !state.links.is_empty();
        let since_heartbeat = state.last_heartbeat.map(|at| at.elapsed());

        let mut links: Vec<LinkHealth> = state
            .links
            .iter()
            .map(|(id, link)| LinkHealth {
                link_id: id.clone(),
                connected_for_ms: link.connected_at.elapsed().as_millis() as u64,
                idle_ms: link.last_activity.elapsed().as_millis() as u64,
            })
            .collect();
        links.sort_by(|a, b| a.link_id.cmp(&b.link_id));

        GatewayHealth {
            connected,
            healthy: connected && since_heartbeat.is_some_and(|d| d < self.stale_after),
            connection_count: state.links.len(),
            last_heartbeat_ago_ms: since_heartbeat.map(|d| d.as_millis() as u64),
            last_activity_ago_ms: state
                .last_activity
                .map(|at| at.elapsed().as_millis() as u64),
            stale_after_ms: self.stale_after.as_millis() as u64,
            links,
        }
    }
}

impl Default for ConnectionGateway {
    fn default() -> Self {
        Self::new()
    }
}
