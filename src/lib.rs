//! # hivework
//!
//! Worker coordination and task claiming over a shared versioned store.
//!
//! Workers never talk to each other. Each one heartbeats its state into a
//! single registry document; coordinators read that document, write a
//! desired state back, and wait for workers to pick it up. Separately,
//! tasks are found with composable predicates over the pending workitem
//! collection and claimed with an optimistic compare-and-swap on their
//! `claimant` param.
//!
//! ## Layout
//!
//! - [`store`]: the [`StorageBackend`](store::StorageBackend) trait, an
//!   in-memory backend and the read-modify-write document helper.
//! - [`worker`]: [`Worker`], [`WorkerRegistry`] and [`WorkerCoordinator`].
//! - [`workitem`]: [`Workitem`](workitem::Workitem) and the
//!   [`WorkitemStore`](workitem::WorkitemStore) seam to the engine.
//! - [`task`]: [`Task`] views, the claim protocol and [`Finder`].
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use hivework::store::{InMemoryBackend, SharedBackend};
//! use hivework::{HiveConfig, Worker, WorkerCoordinator, WorkerRegistry, WorkerState};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> hivework::Result<()> {
//! let backend: SharedBackend = Arc::new(InMemoryBackend::new());
//! let config = HiveConfig::from_toml_str("[worker]\nheartbeat_interval_ms = 10\n")?;
//! let registry = WorkerRegistry::new(backend);
//!
//! let worker = Worker::start(registry.clone(), &config.worker, None).await?;
//! let coordinator = WorkerCoordinator::with_config(registry, config.coordinator);
//!
//! coordinator.pause_all(Some(Duration::from_secs(2))).await?;
//! assert_eq!(worker.state(), WorkerState::Paused);
//!
//! coordinator.unpause_all(Some(Duration::from_secs(2))).await?;
//! worker.shutdown().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod constants;
pub mod error;
pub mod error_record;
#[cfg(feature = "logging")]
pub mod logging;
pub mod store;
pub mod support;
pub mod task;
pub mod worker;
pub mod workitem;

pub use config::HiveConfig;
pub use error::{HiveError, Result};
pub use task::{Finder, Task};
pub use worker::{Worker, WorkerCoordinator, WorkerRegistry, WorkerState};
