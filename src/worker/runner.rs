//! Long-lived workers that heartbeat into the registry.
//!
//! A [`Worker`] owns a tokio task that, once per heartbeat interval:
//!
//! 1. reads the control document and, if `worker_state_enabled` is on,
//!    adopts the cluster-wide desired state;
//! 2. calls the engine-supplied [`WorkProcessor`] if the worker is running;
//! 3. writes `{state, put_at: now}` into its registry entry.
//!
//! Workers never talk to each other or to coordinators directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::info::WorkerInfo;
use super::registry::WorkerRegistry;
use super::state::WorkerState;
use crate::config::WorkerConfig;
use crate::error::Result;

/// Engine hook invoked once per tick while a worker is running.
#[async_trait]
pub trait WorkProcessor: Send + Sync {
    /// Processes at most one unit of work.
    ///
    /// Returns `true` if something was processed. Errors are logged and the
    /// worker carries on with its next tick.
    async fn process(&self, worker_id: &str) -> Result<bool>;
}

struct WorkerCore {
    id: String,
    registry: WorkerRegistry,
    processor: Option<Arc<dyn WorkProcessor>>,
    state: RwLock<WorkerState>,
    info: RwLock<WorkerInfo>,
    cancel: CancellationToken,
}

impl WorkerCore {
    fn state(&self) -> WorkerState {
        *self.state.read()
    }

    /// Moves the local state to `next` unless the worker already stopped.
    fn transition(&self, next: WorkerState) -> bool {
        let mut state = self.state.write();
        if *state == WorkerState::Stopped || *state == next {
            return false;
        }
        let previous = *state;
        tracing::info!(worker_id = %self.id, from = %previous, to = %next, "worker state changed");
        *state = next;
        if next == WorkerState::Stopped {
            self.cancel.cancel();
        }
        true
    }

    async fn beat(&self) -> Result<WorkerInfo> {
        let snapshot = {
            let mut info = self.info.read().clone();
            info.state = self.state();
            info
        };
        let written = self.registry.heartbeat(&snapshot).await?;
        *self.info.write() = written.clone();
        Ok(written)
    }

    async fn tick(&self) -> Result<()> {
        let control = self.registry.control().await?;
        if let Some(requested) = control.requested_state() {
            self.transition(requested);
        }

        if self.state() == WorkerState::Running {
            if let Some(processor) = &self.processor {
                match processor.process(&self.id).await {
                    Ok(true) => self.info.write().processed += 1,
                    Ok(false) => {},
                    Err(e) => {
                        tracing::warn!(worker_id = %self.id, error = %e, "work processor failed");
                    },
                }
            }
        }

        self.beat().await?;
        Ok(())
    }
}

/// A running worker.
///
/// Dropping a `Worker` without calling [`shutdown`](Self::shutdown) stops
/// its loop but leaves the last heartbeat in place, so a coordinator will
/// eventually mark it stalled.
pub struct Worker {
    core: Arc<WorkerCore>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("id", &self.core.id)
            .field("state", &self.core.state())
            .finish_non_exhaustive()
    }
}

impl Worker {
    /// Registers a new worker as `running` and spawns its heartbeat loop.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn start(
        registry: WorkerRegistry,
        config: &WorkerConfig,
        processor: Option<Arc<dyn WorkProcessor>>,
    ) -> Result<Self> {
        let id = Uuid::new_v4().to_string();
        let info = WorkerInfo::new(id.clone(), config.name.clone(), WorkerState::Running);
        let core = Arc::new(WorkerCore {
            id,
            registry,
            processor,
            state: RwLock::new(WorkerState::Running),
            info: RwLock::new(info),
            cancel: CancellationToken::new(),
        });
        core.beat().await?;
        tracing::info!(worker_id = %core.id, name = %config.name, "worker started");

        let handle = tokio::spawn(run_loop(core.clone(), config.heartbeat_interval()));
        Ok(Self {
            core,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// The worker's unique id.
    pub fn id(&self) -> &str {
        &self.core.id
    }

    /// The worker's local state.
    pub fn state(&self) -> WorkerState {
        self.core.state()
    }

    /// The worker's entry as currently stored in the registry.
    pub async fn info(&self) -> Result<Option<WorkerInfo>> {
        self.core.registry.get(&self.core.id).await
    }

    /// Resumes processing. No effect once stopped.
    pub async fn run(&self) -> Result<()> {
        self.set_local_state(WorkerState::Running).await
    }

    /// Suspends processing while continuing to heartbeat. No effect once
    /// stopped.
    pub async fn pause(&self) -> Result<()> {
        self.set_local_state(WorkerState::Paused).await
    }

    async fn set_local_state(&self, next: WorkerState) -> Result<()> {
        if self.core.transition(next) {
            self.core.beat().await?;
        }
        Ok(())
    }

    /// Stops the loop and records `stopped` in the registry.
    ///
    /// The registry entry is kept so the terminal state stays observable.
    pub async fn shutdown(&self) -> Result<()> {
        self.core.transition(WorkerState::Stopped);
        self.core.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(worker_id = %self.core.id, error = %e, "worker loop ended abnormally");
            }
        }
        self.core.beat().await?;
        tracing::info!(worker_id = %self.core.id, "worker shut down");
        Ok(())
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.core.cancel.cancel();
    }
}

async fn run_loop(core: Arc<WorkerCore>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; registration already beat.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = core.cancel.cancelled() => break,
            _ = ticker.tick() => {},
        }
        if let Err(e) = core.tick().await {
            tracing::warn!(worker_id = %core.id, error = %e, "worker tick failed");
        }
        if core.cancel.is_cancelled() {
            break;
        }
    }
    tracing::debug!(worker_id = %core.id, "worker loop exited");
}
