//! Plain WebSocket transport for design plugin links

pub mod handler;

pub use handler::plugin_ws_handler;
