//! Cluster-wide worker control.
//!
//! [`WorkerCoordinator`] never addresses workers directly. It writes the
//! desired state into the control document and then watches the registry
//! until every live worker has reported it, or a deadline passes.
//!
//! `refresh` and `change_state` force the `worker_state_enabled` flag on
//! while they run and put back whatever value it had before, whether they
//! succeed or fail.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use hivework::store::InMemoryBackend;
//! use hivework::{WorkerCoordinator, WorkerRegistry};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = WorkerRegistry::new(Arc::new(InMemoryBackend::new()));
//! let coordinator = WorkerCoordinator::new(registry);
//!
//! // No workers registered: nothing to wait for.
//! coordinator.pause_all(Some(Duration::from_millis(50))).await.unwrap();
//! assert!(!coordinator.worker_state_enabled().await.unwrap());
//! # }
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::info::WorkerInfo;
use super::registry::WorkerRegistry;
use super::state::WorkerState;
use crate::config::CoordinatorConfig;
use crate::error::{HiveError, Result};
use crate::support::poll_until;

/// Cluster-wide snapshot, stall detection and state changes.
#[derive(Debug, Clone)]
pub struct WorkerCoordinator {
    registry: WorkerRegistry,
    config: CoordinatorConfig,
}

impl WorkerCoordinator {
    /// Creates a coordinator with default timeouts.
    pub fn new(registry: WorkerRegistry) -> Self {
        Self::with_config(registry, CoordinatorConfig::default())
    }

    /// Creates a coordinator with the given timeouts.
    ///
    /// The registry's write retry budget is taken from
    /// `config.max_write_attempts`.
    pub fn with_config(registry: WorkerRegistry, config: CoordinatorConfig) -> Self {
        let registry = registry.with_max_attempts(config.max_write_attempts);
        Self { registry, config }
    }

    /// The registry this coordinator reads and writes.
    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Every registry entry, including stopped and stalled workers.
    pub async fn worker_info(&self) -> Result<BTreeMap<String, WorkerInfo>> {
        self.registry.workers().await
    }

    /// States of live-looking workers.
    ///
    /// Entries recorded as `stopped`, `stalled` or without a recognisable
    /// state are left out.
    pub async fn all_worker_states(&self) -> Result<BTreeMap<String, WorkerState>> {
        Ok(self
            .registry
            .workers()
            .await?
            .into_iter()
            .filter(|(_, info)| info.state.is_live())
            .map(|(id, info)| (id, info.state))
            .collect())
    }

    /// Marks unresponsive workers `stalled`.
    ///
    /// A worker is a suspect when it is not stopped and its last heartbeat
    /// is older than `timeout` (default: the configured stall timeout). Each
    /// suspect then gets up to `timeout` from the start of the sweep to
    /// heartbeat again; those that don't are marked. Returns the ids that
    /// were marked.
    ///
    /// Workers already marked stalled are not marked again. A stalled
    /// worker that resumes heartbeating overwrites the mark itself.
    pub async fn refresh(&self, timeout: Option<Duration>) -> Result<Vec<String>> {
        let timeout = timeout.unwrap_or_else(|| self.config.stall_timeout());
        self.with_worker_state_enabled(|| self.sweep_stalled(timeout)).await
    }

    async fn sweep_stalled(&self, timeout: Duration) -> Result<Vec<String>> {
        let sweep_started = Utc::now();
        let suspects: Vec<(String, DateTime<Utc>)> = self
            .registry
            .workers()
            .await?
            .into_values()
            .filter(|info| {
                !info.is_stopped()
                    && info.state != WorkerState::Stalled
                    && info.is_stale(timeout, sweep_started)
            })
            .map(|info| (info.worker_id, info.put_at))
            .collect();
        if suspects.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(suspects = suspects.len(), ?timeout, "waiting on stale workers");

        let registry = &self.registry;
        let watched = &suspects;
        let recovered = poll_until(timeout, self.config.poll_interval(), move || async move {
            let current = registry.workers().await?;
            let all_back = watched.iter().all(|(id, seen)| {
                current
                    .get(id)
                    .map_or(true, |info| info.put_at > *seen || info.is_stopped())
            });
            Ok::<_, HiveError>(all_back.then_some(()))
        })
        .await?;
        if recovered.is_ok() {
            return Ok(Vec::new());
        }

        let mut marked = Vec::new();
        for (id, seen) in &suspects {
            if self.registry.mark_stalled(id, *seen).await? {
                marked.push(id.clone());
            }
        }
        Ok(marked)
    }

    /// Asks every worker to adopt `target` and waits until every live
    /// worker reports it.
    ///
    /// Succeeds immediately when no live workers exist. The desired state
    /// stays written on failure, so workers may still converge later.
    ///
    /// # Errors
    ///
    /// [`HiveError::WorkerStateNotChanged`] with the observed live states
    /// if `timeout` (default: the configured state change timeout) passes
    /// first.
    pub async fn change_state(&self, target: WorkerState, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or_else(|| self.config.state_change_timeout());
        self.with_worker_state_enabled(|| self.converge(target, timeout)).await
    }

    async fn converge(&self, target: WorkerState, timeout: Duration) -> Result<()> {
        self.registry.set_desired_state(target).await?;
        tracing::info!(%target, ?timeout, "requested worker state change");

        let this = self;
        let outcome = poll_until(timeout, self.config.poll_interval(), move || async move {
            let states = this.all_worker_states().await?;
            Ok::<_, HiveError>(states.values().all(|state| *state == target).then_some(()))
        })
        .await?;

        match outcome {
            Ok(()) => Ok(()),
            Err(waited) => {
                let states = self.all_worker_states().await?;
                tracing::warn!(%target, waited = ?waited.waited, ?states, "worker states did not converge");
                Err(HiveError::WorkerStateNotChanged { target, states })
            },
        }
    }

    /// Stops every worker, then sets the desired state back to `running`
    /// whatever the outcome of the stop.
    ///
    /// The stop-phase error, if any, is returned after the reset.
    pub async fn shutdown_all(&self, timeout: Option<Duration>) -> Result<()> {
        let stopped = self.change_state(WorkerState::Stopped, timeout).await;
        let reset = self.change_state(WorkerState::Running, timeout).await;
        if let (Err(_), Err(e)) = (&stopped, &reset) {
            tracing::error!(error = %e, "failed to reset workers to running after shutdown");
        }
        stopped.and(reset)
    }

    /// Pauses every live worker.
    pub async fn pause_all(&self, timeout: Option<Duration>) -> Result<()> {
        self.change_state(WorkerState::Paused, timeout).await
    }

    /// Resumes every live worker.
    pub async fn unpause_all(&self, timeout: Option<Duration>) -> Result<()> {
        self.change_state(WorkerState::Running, timeout).await
    }

    /// Reads the persisted `worker_state_enabled` flag.
    pub async fn worker_state_enabled(&self) -> Result<bool> {
        Ok(self.registry.control().await?.enabled)
    }

    /// Writes the persisted `worker_state_enabled` flag.
    pub async fn toggle_worker_state_enabled(&self, enabled: bool) -> Result<()> {
        self.registry.set_state_enabled(enabled).await?;
        Ok(())
    }

    async fn with_worker_state_enabled<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let was_enabled = self.worker_state_enabled().await?;
        if !was_enabled {
            self.toggle_worker_state_enabled(true).await?;
        }

        let result = op().await;

        if !was_enabled {
            if let Err(e) = self.toggle_worker_state_enabled(false).await {
                if result.is_ok() {
                    return Err(e);
                }
                tracing::error!(error = %e, "failed to restore worker_state_enabled");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryBackend;
    use std::sync::Arc;

    fn coordinator() -> WorkerCoordinator {
        let registry = WorkerRegistry::new(Arc::new(InMemoryBackend::new()));
        WorkerCoordinator::with_config(
            registry,
            CoordinatorConfig::default().with_poll_interval(Duration::from_millis(5)),
        )
    }

    async fn seed(coordinator: &WorkerCoordinator, id: &str, state: WorkerState) -> WorkerInfo {
        let info = WorkerInfo::new(id, "seed", state);
        coordinator.registry().heartbeat(&info).await.unwrap()
    }

    #[tokio::test]
    async fn snapshot_excludes_dead_states() {
        let coordinator = coordinator();
        seed(&coordinator, "a", WorkerState::Running).await;
        seed(&coordinator, "b", WorkerState::Paused).await;
        seed(&coordinator, "c", WorkerState::Stopped).await;
        seed(&coordinator, "d", WorkerState::Stalled).await;
        seed(&coordinator, "e", WorkerState::Unknown).await;

        let states = coordinator.all_worker_states().await.unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states["a"], WorkerState::Running);
        assert_eq!(states["b"], WorkerState::Paused);
        assert_eq!(coordinator.worker_info().await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn change_state_with_no_workers_succeeds() {
        let coordinator = coordinator();
        coordinator
            .change_state(WorkerState::Paused, Some(Duration::ZERO))
            .await
            .unwrap();
        assert_eq!(
            coordinator.registry().control().await.unwrap().state,
            WorkerState::Paused
        );
    }

    #[tokio::test]
    async fn change_state_times_out_on_unresponsive_worker() {
        let coordinator = coordinator();
        seed(&coordinator, "a", WorkerState::Running).await;

        let err = coordinator
            .change_state(WorkerState::Paused, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        match err {
            HiveError::WorkerStateNotChanged { target, states } => {
                assert_eq!(target, WorkerState::Paused);
                assert_eq!(states["a"], WorkerState::Running);
            },
            other => panic!("unexpected error: {other}"),
        }
        // Not rolled back.
        assert_eq!(
            coordinator.registry().control().await.unwrap().state,
            WorkerState::Paused
        );
        assert!(!coordinator.worker_state_enabled().await.unwrap());
    }

    #[tokio::test]
    async fn refresh_ignores_fresh_and_stopped_workers() {
        let coordinator = coordinator();
        seed(&coordinator, "fresh", WorkerState::Running).await;
        seed(&coordinator, "done", WorkerState::Stopped).await;

        let marked = coordinator
            .refresh(Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert!(marked.is_empty());
        let states = coordinator.all_worker_states().await.unwrap();
        assert_eq!(states.len(), 1);
    }

    #[tokio::test]
    async fn flag_is_kept_on_when_already_enabled() {
        let coordinator = coordinator();
        coordinator.toggle_worker_state_enabled(true).await.unwrap();
        coordinator.refresh(Some(Duration::ZERO)).await.unwrap();
        assert!(coordinator.worker_state_enabled().await.unwrap());

        coordinator.toggle_worker_state_enabled(false).await.unwrap();
        coordinator.refresh(Some(Duration::ZERO)).await.unwrap();
        assert!(!coordinator.worker_state_enabled().await.unwrap());
    }
}
