//! Application state

use std::sync::Arc;

use bridge_core::{ConnectionDiagnostics, ConnectionGateway, DispatchCoordinator, TaskRegistry};

use crate::config::BridgeConfig;

/// Outbound queue depth per plugin link
pub const LINK_BUFFER: usize = 100;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: BridgeConfig,
    registry: TaskRegistry,
    gateway: Arc<ConnectionGateway>,
}

impl AppState {
    /// Build the registry and gateway and wire them together
    pub fn new(config: BridgeConfig) -> Self {
        let registry =
            TaskRegistry::with_history_capacity(config.policy.clone(), config.history_capacity);
        let gateway = Arc::new(ConnectionGateway::with_stale_after(config.stale_after));

        DispatchCoordinator::install(
            &registry,
            &gateway,
            ConnectionDiagnostics {
                socket_port: config.socket_port,
                ..ConnectionDiagnostics::default()
            },
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                registry,
                gateway,
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.inner.registry
    }

    pub fn gateway(&self) -> &Arc<ConnectionGateway> {
        &self.inner.gateway
    }
}
