//! Worker lifecycle coordination.
//!
//! - [`Worker`] heartbeats its own state into the registry document.
//! - [`WorkerRegistry`] owns the registry and control documents.
//! - [`WorkerCoordinator`] drives cluster-wide state changes and stall
//!   detection through those documents.

pub mod coordinator;
pub mod info;
pub mod registry;
pub mod runner;
pub mod state;

pub use coordinator::WorkerCoordinator;
pub use info::{WorkerControl, WorkerInfo, WorkersDocument};
pub use registry::WorkerRegistry;
pub use runner::{WorkProcessor, Worker};
pub use state::WorkerState;
