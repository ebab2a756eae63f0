//! The worker registry service.
//!
//! [`WorkerRegistry`] owns the two shared documents workers coordinate
//! through: the registry document (`variables/workers`) and the control
//! document (`variables/worker_state`). It is injected into every
//! [`Worker`](super::Worker) and [`WorkerCoordinator`](super::WorkerCoordinator)
//! rather than living in a process-wide singleton.
//!
//! Every write is a read-modify-write over the whole document, retried on
//! version conflicts by [`read_modify_write`]. Callers never see a conflict
//! unless the retry budget runs out.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::info::{WorkerControl, WorkerInfo, WorkersDocument};
use super::state::WorkerState;
use crate::constants::{WORKERS_KEY, WORKER_STATE_KEY};
use crate::error::Result;
use crate::store::document::{self, read_modify_write, DEFAULT_MAX_ATTEMPTS};
use crate::store::SharedBackend;

/// Shared handle on the worker registry and control documents.
///
/// Cloning is cheap; clones share the backend.
#[derive(Clone)]
pub struct WorkerRegistry {
    backend: SharedBackend,
    max_attempts: u32,
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerRegistry")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl WorkerRegistry {
    /// Creates a registry over the given backend.
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets how many conflicting attempts a write makes before giving up.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// The backend this registry writes to.
    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    /// Every registered worker, keyed by id.
    pub async fn workers(&self) -> Result<BTreeMap<String, WorkerInfo>> {
        Ok(document::read::<WorkersDocument>(self.backend.as_ref(), WORKERS_KEY)
            .await?
            .map(|versioned| versioned.doc.workers)
            .unwrap_or_default())
    }

    /// The registry entry for one worker.
    pub async fn get(&self, worker_id: &str) -> Result<Option<WorkerInfo>> {
        Ok(self.workers().await?.remove(worker_id))
    }

    /// Writes `info` as the worker's entry, stamping `put_at` with the
    /// current time.
    ///
    /// The stored `put_at` never moves backwards for a worker id, even if
    /// this host's clock does. Any mark a coordinator left on the entry
    /// (such as `stalled`) is overwritten by the worker's own state.
    pub async fn heartbeat(&self, info: &WorkerInfo) -> Result<WorkerInfo> {
        let mut written = info.clone();
        read_modify_write::<WorkersDocument, _>(
            self.backend.as_ref(),
            WORKERS_KEY,
            self.max_attempts,
            |doc| {
                let mut doc = doc.unwrap_or_default();
                let mut entry = info.clone();
                let now = Utc::now();
                entry.put_at = match doc.workers.get(&info.worker_id) {
                    Some(previous) if previous.put_at > now => previous.put_at,
                    _ => now,
                };
                written = entry.clone();
                doc.workers.insert(entry.worker_id.clone(), entry);
                Ok(doc)
            },
        )
        .await?;
        tracing::trace!(worker_id = %written.worker_id, state = %written.state, "heartbeat recorded");
        Ok(written)
    }

    /// Rewrites a worker's recorded state without touching its heartbeat
    /// time. Returns `false` if the worker is not registered.
    pub async fn record_state(&self, worker_id: &str, state: WorkerState) -> Result<bool> {
        let mut found = false;
        read_modify_write::<WorkersDocument, _>(
            self.backend.as_ref(),
            WORKERS_KEY,
            self.max_attempts,
            |doc| {
                let mut doc = doc.unwrap_or_default();
                found = match doc.workers.get_mut(worker_id) {
                    Some(entry) => {
                        entry.state = state;
                        true
                    },
                    None => false,
                };
                Ok(doc)
            },
        )
        .await?;
        Ok(found)
    }

    /// Marks a worker `stalled`, but only if its heartbeat is still the one
    /// observed at `seen_put_at` and it is not stopped.
    ///
    /// Returns `true` if the mark was written. A worker that heartbeat in
    /// the meantime keeps its state.
    pub async fn mark_stalled(&self, worker_id: &str, seen_put_at: DateTime<Utc>) -> Result<bool> {
        let mut marked = false;
        read_modify_write::<WorkersDocument, _>(
            self.backend.as_ref(),
            WORKERS_KEY,
            self.max_attempts,
            |doc| {
                let mut doc = doc.unwrap_or_default();
                marked = false;
                if let Some(entry) = doc.workers.get_mut(worker_id) {
                    if entry.put_at == seen_put_at && !entry.is_stopped() {
                        entry.state = WorkerState::Stalled;
                        marked = true;
                    }
                }
                Ok(doc)
            },
        )
        .await?;
        if marked {
            tracing::warn!(worker_id = worker_id, last_heartbeat = %seen_put_at, "worker marked stalled");
        }
        Ok(marked)
    }

    /// The current control document, or its defaults if none was written.
    pub async fn control(&self) -> Result<WorkerControl> {
        Ok(
            document::read::<WorkerControl>(self.backend.as_ref(), WORKER_STATE_KEY)
                .await?
                .map(|versioned| versioned.doc)
                .unwrap_or_default(),
        )
    }

    /// Sets the cluster-wide desired worker state.
    pub async fn set_desired_state(&self, state: WorkerState) -> Result<WorkerControl> {
        self.update_control(|control| control.state = state).await
    }

    /// Sets the `worker_state_enabled` flag.
    pub async fn set_state_enabled(&self, enabled: bool) -> Result<WorkerControl> {
        self.update_control(|control| control.enabled = enabled).await
    }

    async fn update_control<F>(&self, apply: F) -> Result<WorkerControl>
    where
        F: Fn(&mut WorkerControl),
    {
        let written = read_modify_write::<WorkerControl, _>(
            self.backend.as_ref(),
            WORKER_STATE_KEY,
            self.max_attempts,
            |control| {
                let mut control = control.unwrap_or_default();
                apply(&mut control);
                Ok(control)
            },
        )
        .await?;
        tracing::debug!(
            desired_state = %written.doc.state,
            enabled = written.doc.enabled,
            "worker control updated"
        );
        Ok(written.doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryBackend;
    use std::sync::Arc;

    fn registry() -> WorkerRegistry {
        WorkerRegistry::new(Arc::new(InMemoryBackend::new()))
    }

    #[tokio::test]
    async fn empty_registry_has_no_workers() {
        let registry = registry();
        assert!(registry.workers().await.unwrap().is_empty());
        assert_eq!(registry.control().await.unwrap(), WorkerControl::default());
    }

    #[tokio::test]
    async fn heartbeat_registers_and_refreshes() {
        let registry = registry();
        let info = WorkerInfo::new("w-1", "worker", WorkerState::Running);
        let first = registry.heartbeat(&info).await.unwrap();
        let second = registry.heartbeat(&info).await.unwrap();
        assert!(second.put_at >= first.put_at);

        let stored = registry.get("w-1").await.unwrap().unwrap();
        assert_eq!(stored.state, WorkerState::Running);
        assert_eq!(stored.put_at, second.put_at);
    }

    #[tokio::test]
    async fn record_state_on_unknown_worker_reports_missing() {
        let registry = registry();
        assert!(!registry
            .record_state("ghost", WorkerState::Stalled)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn mark_stalled_skips_workers_that_heartbeat_since() {
        let registry = registry();
        let info = WorkerInfo::new("w-1", "worker", WorkerState::Running);
        let seen = registry.heartbeat(&info).await.unwrap().put_at;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        registry.heartbeat(&info).await.unwrap();

        assert!(!registry.mark_stalled("w-1", seen).await.unwrap());
        assert_eq!(
            registry.get("w-1").await.unwrap().unwrap().state,
            WorkerState::Running
        );
    }

    #[tokio::test]
    async fn mark_stalled_leaves_stopped_workers() {
        let registry = registry();
        let info = WorkerInfo::new("w-1", "worker", WorkerState::Stopped);
        let seen = registry.heartbeat(&info).await.unwrap().put_at;
        assert!(!registry.mark_stalled("w-1", seen).await.unwrap());
    }

    #[tokio::test]
    async fn control_fields_update_independently() {
        let registry = registry();
        registry.set_state_enabled(true).await.unwrap();
        let control = registry
            .set_desired_state(WorkerState::Paused)
            .await
            .unwrap();
        assert!(control.enabled);
        assert_eq!(control.state, WorkerState::Paused);

        let control = registry.set_state_enabled(false).await.unwrap();
        assert_eq!(control.state, WorkerState::Paused);
        assert_eq!(control.requested_state(), None);
    }
}
