//! WebSocket handler for design plugin links
//!
//! Frames are JSON text carrying the tagged protocol union, so a plugin can
//! talk to the bridge without a Socket.IO client.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use bridge_core::protocol::{InboundMessage, OutboundMessage};
use bridge_core::{ConnectionGateway, LinkId};

use crate::state::{AppState, LINK_BUFFER};

/// WebSocket upgrade handler
pub async fn plugin_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let gateway = Arc::clone(state.gateway());
    ws.on_upgrade(move |socket| handle_plugin_socket(socket, gateway))
}

/// Handle an individual plugin WebSocket connection
async fn handle_plugin_socket(socket: WebSocket, gateway: Arc<ConnectionGateway>) {
    let link = LinkId::generate();
    info!("Plugin WebSocket connected: {}", link);

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Channel for sending messages to this plugin
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(LINK_BUFFER);

    // Task to forward messages from channel to WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize {}: {}", msg.event_name(), e);
                }
            }
        }
    });

    gateway.add_link(link.clone(), tx);

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => handle_frame(&gateway, &link, text.as_str()),
            Ok(Message::Close(_)) => {
                info!("Plugin {} sent close frame", link);
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                debug!("Transport ping/pong from {}", link);
                gateway.touch(&link);
            }
            Ok(Message::Binary(_)) => {
                warn!("Unexpected binary message from {}", link);
            }
            Err(e) => {
                error!("WebSocket error from {}: {}", link, e);
                break;
            }
        }
    }

    // Cleanup on disconnect
    info!("Plugin WebSocket {} disconnected", link);
    gateway.remove_link(&link);
    send_task.abort();
}

fn handle_frame(gateway: &ConnectionGateway, link: &LinkId, text: &str) {
    match serde_json::from_str::<InboundMessage>(text) {
        Ok(msg) => {
            debug!("{} from {}", msg.event_name(), link);
            gateway.handle_inbound(link, msg);
        }
        Err(e) => {
            // Still proof of life
            gateway.touch(link);
            warn!("Failed to parse message from {}: {}", link, e);
        }
    }
}
