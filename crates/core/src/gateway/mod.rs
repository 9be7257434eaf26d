//! Gateway module for design plugin links
//!
//! The gateway knows nothing about transports: a transport attaches each
//! physical connection as a link (an outbound channel) and feeds inbound
//! messages back through [`ConnectionGateway::handle_inbound`].

pub mod heartbeat;
pub mod manager;

pub use heartbeat::{spawn_keepalive, DEFAULT_KEEPALIVE_INTERVAL};
pub use manager::{
    ConnectionGateway, GatewayHealth, LinkHealth, LinkId, TaskEventHook, DEFAULT_STALE_AFTER,
};
