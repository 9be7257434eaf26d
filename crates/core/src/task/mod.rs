//! Task module
//!
//! Pending work, its bounded history and the registry that owns both.

mod history;
mod model;
mod registry;

pub use history::{TaskHistory, DEFAULT_HISTORY_CAPACITY};
pub use model::*;
pub use registry::{TaskAddedHook, TaskHandle, TaskRegistry, UpdateOutcome, WeakTaskRegistry};
