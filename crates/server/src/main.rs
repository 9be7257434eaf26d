//! Bridge server for the design-tool plugin
//!
//! Hosts the task bridge: the plugin links in over Socket.IO (socket port) or
//! a plain WebSocket (HTTP port), and commands are invoked over REST.

mod config;
mod gateway;
mod routes;
mod socket;
mod state;

use anyhow::Context;
use axum::Router;
use bridge_core::gateway::spawn_keepalive;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::BridgeConfig;
use crate::socket::create_socket_layer;
use crate::state::AppState;

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "bridge_server=debug,bridge_core=debug,tower_http=debug,socketioxide=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BridgeConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        default_timeout_ms = config.policy.default_ms,
        history_capacity = config.history_capacity,
        "Configuration loaded"
    );

    let state = AppState::new(config);
    let config = state.config().clone();
    let _keepalive = spawn_keepalive(state.gateway(), config.keepalive_interval);

    let (socket_layer, _io) = create_socket_layer(state.clone());

    // REST API and plain WebSocket links
    let mut rest_app = Router::new()
        .merge(routes::health::router())
        .merge(routes::gateway::router())
        .merge(routes::task::router())
        .with_state(state);
    if config.cors {
        rest_app = rest_app.layer(cors());
    }
    let rest_app = rest_app.layer(TraceLayer::new_for_http());

    // Socket.IO links
    // Layers are applied bottom-to-top, so CorsLayer is added last to be applied first
    let mut socket_app = Router::new().layer(socket_layer);
    if config.cors {
        socket_app = socket_app.layer(cors());
    }

    let rest_addr = config.http_addr();
    let socket_addr = config.socket_addr();

    let rest_listener = tokio::net::TcpListener::bind(rest_addr)
        .await
        .with_context(|| format!("Failed to bind REST listener on {}", rest_addr))?;
    let socket_listener = tokio::net::TcpListener::bind(socket_addr)
        .await
        .with_context(|| format!("Failed to bind Socket.IO listener on {}", socket_addr))?;

    tracing::info!("REST API listening on {}", rest_addr);
    tracing::info!("Socket.IO listening on {}", socket_addr);

    let rest_handle = tokio::spawn(async move { axum::serve(rest_listener, rest_app).await });
    let socket_handle =
        tokio::spawn(async move { axum::serve(socket_listener, socket_app).await });

    // Wait for both
    let (rest, socket) = tokio::try_join!(rest_handle, socket_handle)?;
    rest.context("REST server failed")?;
    socket.context("Socket.IO server failed")?;

    Ok(())
}
