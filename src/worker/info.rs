//! Worker info records and the shared documents they live in.
//!
//! [`WorkerInfo`] is one worker's entry in the registry document stored at
//! [`WORKERS_KEY`](crate::constants::WORKERS_KEY). [`WorkerControl`] is the
//! cluster-wide desired state and the `worker_state_enabled` flag, stored at
//! [`WORKER_STATE_KEY`](crate::constants::WORKER_STATE_KEY).

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::state::WorkerState;

/// One worker's heartbeat record.
///
/// # Examples
///
/// ```
/// use hivework::worker::WorkerInfo;
/// use hivework::WorkerState;
///
/// let info = WorkerInfo::new("w-1", "hivework::Worker", WorkerState::Running);
/// assert_eq!(info.worker_id, "w-1");
/// assert!(!info.is_stopped());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// Unique id generated when the worker started.
    pub worker_id: String,

    /// Last state written by the worker or a coordinator.
    #[serde(default, deserialize_with = "nullable_state")]
    pub state: WorkerState,

    /// Time of the last heartbeat write.
    pub put_at: DateTime<Utc>,

    /// Human-readable worker label.
    #[serde(default)]
    pub name: String,

    /// Host the worker runs on.
    #[serde(default)]
    pub hostname: String,

    /// OS process id of the worker.
    #[serde(default)]
    pub pid: u32,

    /// When the worker started.
    #[serde(default = "Utc::now")]
    pub started_at: DateTime<Utc>,

    /// Number of work-loop ticks that processed something.
    #[serde(default)]
    pub processed: u64,
}

fn nullable_state<'de, D>(deserializer: D) -> Result<WorkerState, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<WorkerState>::deserialize(deserializer)?.unwrap_or_default())
}

impl WorkerInfo {
    /// Creates a record stamped with the current time and this process's
    /// host metadata.
    pub fn new(worker_id: impl Into<String>, name: impl Into<String>, state: WorkerState) -> Self {
        let now = Utc::now();
        Self {
            worker_id: worker_id.into(),
            state,
            put_at: now,
            name: name.into(),
            hostname: local_hostname(),
            pid: std::process::id(),
            started_at: now,
            processed: 0,
        }
    }

    /// Time of the last heartbeat.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.put_at
    }

    /// `true` when the worker recorded `stopped`.
    pub fn is_stopped(&self) -> bool {
        self.state == WorkerState::Stopped
    }

    /// `true` when the last heartbeat is older than `threshold` at `now`.
    pub fn is_stale(&self, threshold: Duration, now: DateTime<Utc>) -> bool {
        chrono::Duration::from_std(threshold)
            .ok()
            .and_then(|threshold| now.checked_sub_signed(threshold))
            .is_some_and(|cutoff| self.put_at < cutoff)
    }

    /// Time since the worker started, as of its last heartbeat.
    pub fn uptime(&self) -> Duration {
        (self.put_at - self.started_at).to_std().unwrap_or_default()
    }
}

fn local_hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}

/// The registry document: every worker ever registered, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkersDocument {
    /// Entries keyed by `worker_id`.
    #[serde(default)]
    pub workers: BTreeMap<String, WorkerInfo>,
}

/// Cluster-wide worker control document.
///
/// # Examples
///
/// ```
/// use hivework::worker::WorkerControl;
/// use hivework::WorkerState;
///
/// let control = WorkerControl::default();
/// assert_eq!(control.state, WorkerState::Running);
/// assert!(!control.enabled);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerControl {
    /// State every worker should adopt while `enabled` is on.
    #[serde(default = "default_desired_state")]
    pub state: WorkerState,

    /// The `worker_state_enabled` flag.
    #[serde(default)]
    pub enabled: bool,
}

fn default_desired_state() -> WorkerState {
    WorkerState::Running
}

impl Default for WorkerControl {
    fn default() -> Self {
        Self {
            state: default_desired_state(),
            enabled: false,
        }
    }
}

impl WorkerControl {
    /// The state workers should adopt, if the flag is on and the desired
    /// state is one a worker can act on.
    pub fn requested_state(&self) -> Option<WorkerState> {
        (self.enabled && self.state.is_requestable()).then_some(self.state)
    }
}
