//! Outbound keep-alive loop

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use super::manager::ConnectionGateway;
use crate::protocol::{KeepAlive, OutboundMessage};

/// Keep-alive ping interval
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Ping every link on a fixed interval, idle or not.
///
/// Some socket transports half-close idle connections without telling either
/// side; regular traffic surfaces that early. The loop ends once the gateway
/// is dropped.
pub fn spawn_keepalive(gateway: &Arc<ConnectionGateway>, interval: Duration) -> JoinHandle<()> {
    let gateway = Arc::downgrade(gateway);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(gateway) = gateway.upgrade() else {
                break;
            };
            if gateway.send(OutboundMessage::KeepAlivePing(KeepAlive::now())) {
                debug!("Keep-alive ping sent to {} link(s)", gateway.connection_count());
            }
        }

        debug!("Keep-alive loop exiting");
    })
}
