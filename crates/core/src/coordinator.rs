//! Dispatch coordinator - routes new tasks to the gateway and results back

use std::sync::{Arc, Weak};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::BridgeError;
use crate::gateway::ConnectionGateway;
use crate::protocol::OutboundMessage;
use crate::task::{Task, TaskRegistry, TaskStatus};

/// Default Socket.IO port the plugin is expected to connect to
pub const DEFAULT_SOCKET_PORT: u16 = 3056;

/// Troubleshooting details attached to "not connected" failures
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDiagnostics {
    pub plugin_name: String,
    pub socket_port: u16,
}

impl Default for ConnectionDiagnostics {
    fn default() -> Self {
        Self {
            plugin_name: "Design Bridge".to_string(),
            socket_port: DEFAULT_SOCKET_PORT,
        }
    }
}

impl ConnectionDiagnostics {
    fn help(&self) -> String {
        format!(
            "Open the {} plugin in the design tool and make sure it is connected to port {}",
            self.plugin_name, self.socket_port
        )
    }

    fn status(&self, gateway: Option<&ConnectionGateway>) -> Value {
        json!({
            "connected": gateway.is_some_and(|g| g.is_connected()),
            "connectionCount": gateway.map_or(0, |g| g.connection_count()),
            "expectedPort": self.socket_port,
        })
    }
}

/// Stateless glue between [`TaskRegistry`] and [`ConnectionGateway`]
pub struct DispatchCoordinator;

impl DispatchCoordinator {
    /// Wire a registry and a gateway together.
    ///
    /// Each side only holds a weak reference to the other; the caller keeps
    /// both alive.
    pub fn install(
        registry: &TaskRegistry,
        gateway: &Arc<ConnectionGateway>,
        diagnostics: ConnectionDiagnostics,
    ) {
        let weak_gateway = Arc::downgrade(gateway);
        registry.on_task_added(move |registry, task| {
            dispatch(registry, &weak_gateway, &diagnostics, task);
        });

        let finished = registry.downgrade();
        gateway.on_task_finished(move |event| {
            if let Some(registry) = finished.upgrade() {
                registry.update_task(event.task_id, event.content, TaskStatus::Completed);
            }
        });

        let failed = registry.downgrade();
        gateway.on_task_error(move |event| {
            if let Some(registry) = failed.upgrade() {
                registry.update_task(event.task_id, event.content, TaskStatus::Failed);
            }
        });
    }
}

fn dispatch(
    registry: &TaskRegistry,
    gateway: &Weak<ConnectionGateway>,
    diagnostics: &ConnectionDiagnostics,
    task: &Task,
) {
    let gateway = gateway.upgrade();
    let connected = gateway.as_ref().is_some_and(|g| g.is_connected());

    if !connected {
        warn!("Cannot dispatch {} ({}): not connected", task.command, task.id);
        let payload = json!({
            "error": BridgeError::NotConnected.to_string(),
            "help": diagnostics.help(),
            "connectionStatus": diagnostics.status(gateway.as_deref()),
        });
        registry.update_task(task.id, payload, TaskStatus::Failed);
        return;
    }

    let sent = gateway
        .as_ref()
        .is_some_and(|g| g.send(OutboundMessage::StartTask(task.to_request())));

    if !sent {
        warn!("Failed to send {} ({}) to the design plugin", task.command, task.id);
        let payload = json!({
            "error": BridgeError::SendFailed.to_string(),
            "connectionStatus": diagnostics.status(gateway.as_deref()),
        });
        registry.update_task(task.id, payload, TaskStatus::Failed);
        return;
    }

    debug!("Dispatched {} ({})", task.command, task.id);
}
