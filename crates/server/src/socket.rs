//! Socket.IO transport for design plugin links
//!
//! Each Socket.IO socket is one physical link. Outbound messages are emitted
//! under their wire event name; inbound events are parsed into the protocol
//! union and handed to the gateway.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use socketioxide::extract::{Data, SocketRef, State};
use socketioxide::{SocketIo, TransportType};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use bridge_core::protocol::{events, InboundMessage, KeepAlive, OutboundMessage};
use bridge_core::LinkId;

use crate::state::{AppState, LINK_BUFFER};

/// Application-level probe the plugin may send on its own schedule
const PLUGIN_PING: &str = "ping";
const PLUGIN_PONG: &str = "pong";

fn link_of(socket: &SocketRef) -> LinkId {
    LinkId::new(socket.id.to_string())
}

/// Handle new socket connection
pub async fn on_connect(socket: SocketRef, State(state): State<AppState>) {
    let link = link_of(&socket);
    info!("Plugin socket connected: {}", link);

    // Outbound messages for this link, drained by a dedicated task
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(LINK_BUFFER);
    let out = socket.clone();
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match msg.payload() {
                Ok(payload) => {
                    if let Err(e) = out.emit(msg.event_name(), &payload) {
                        warn!("Failed to emit {} to {}: {}", msg.event_name(), out.id, e);
                    }
                }
                Err(e) => error!("Failed to serialize {}: {}", msg.event_name(), e),
            }
        }
    });
    state.gateway().add_link(link, tx);

    socket.on(
        events::TASK_FINISHED,
        |socket: SocketRef, State(state): State<AppState>, Data(data): Data<Value>| async move {
            route(&socket, &state, events::TASK_FINISHED, data, InboundMessage::TaskFinished);
        },
    );

    socket.on(
        events::TASK_FAILED,
        |socket: SocketRef, State(state): State<AppState>, Data(data): Data<Value>| async move {
            route(&socket, &state, events::TASK_FAILED, data, InboundMessage::TaskFailed);
        },
    );

    socket.on(
        events::KEEP_ALIVE_PONG,
        |socket: SocketRef, State(state): State<AppState>, Data(data): Data<Value>| async move {
            route(&socket, &state, events::KEEP_ALIVE_PONG, data, InboundMessage::KeepAlivePong);
        },
    );

    socket.on(
        events::HEARTBEAT_ACK,
        |socket: SocketRef, State(state): State<AppState>, Data(data): Data<Value>| async move {
            route(&socket, &state, events::HEARTBEAT_ACK, data, InboundMessage::HeartbeatAck);
        },
    );

    socket.on(
        PLUGIN_PING,
        |socket: SocketRef, State(state): State<AppState>| async move {
            state.gateway().touch(&link_of(&socket));
            if let Err(e) = socket.emit(PLUGIN_PONG, &KeepAlive::now()) {
                warn!("Failed to answer ping from {}: {}", socket.id, e);
            }
        },
    );

    let gateway = Arc::clone(state.gateway());
    socket.on_disconnect(move |socket: SocketRef| {
        let gateway = Arc::clone(&gateway);
        async move {
            info!("Plugin socket disconnected: {}", socket.id);
            gateway.remove_link(&link_of(&socket));
        }
    });
}

/// Parse an inbound event body and pass it to the gateway.
///
/// Malformed bodies still count as traffic for the heartbeat.
fn route<T, F>(socket: &SocketRef, state: &AppState, event: &str, data: Value, wrap: F)
where
    T: DeserializeOwned,
    F: FnOnce(T) -> InboundMessage,
{
    let link = link_of(socket);
    match serde_json::from_value::<T>(data) {
        Ok(body) => {
            debug!("{} from {}", event, link);
            state.gateway().handle_inbound(&link, wrap(body));
        }
        Err(e) => {
            state.gateway().touch(&link);
            warn!("Malformed {} from {}: {}", event, link, e);
        }
    }
}

/// Create and configure Socket.IO layer
pub fn create_socket_layer(state: AppState) -> (socketioxide::layer::SocketIoLayer, SocketIo) {
    let (layer, io) = SocketIo::builder()
        .with_state(state)
        // Plugins connect over WebSocket only; polling needs sticky sessions
        .transports([TransportType::Websocket])
        .build_layer();

    io.ns("/", on_connect);

    (layer, io)
}
