//! Core library for the design-tool bridge
//!
//! This crate turns a "run command X with args Y" request into an
//! asynchronous round trip through a socket link to the design plugin:
//! - Task registry (pending work, timeouts, at-most-once resolution)
//! - Connection gateway (link liveness, delivery, inbound routing)
//! - Dispatch coordinator (glue between the two)

pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod policy;
pub mod protocol;
pub mod task;

pub use coordinator::{ConnectionDiagnostics, DispatchCoordinator};
pub use error::BridgeError;
pub use gateway::{ConnectionGateway, GatewayHealth, LinkId};
pub use policy::TimeoutPolicy;
pub use task::{TaskHandle, TaskId, TaskOutcome, TaskRegistry, TaskStatus, UpdateOutcome};

pub type Result<T> = std::result::Result<T, BridgeError>;
