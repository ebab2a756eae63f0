//! TOML-based configuration for workers, coordinators and task finders.
//!
//! Every section is optional and falls back to its defaults.
//!
//! # Example TOML
//!
//! ```toml
//! [worker]
//! name = "billing-worker"
//! heartbeat_interval_ms = 500
//!
//! [coordinator]
//! state_change_timeout_ms = 5000
//! stall_timeout_ms = 10000
//! poll_interval_ms = 100
//!
//! [tasks]
//! next_available_timeout_ms = 5000
//! poll_interval_ms = 100
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HiveError, Result};
use crate::store::document::DEFAULT_MAX_ATTEMPTS;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiveConfig {
    /// Settings for individual workers.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Settings for cluster-wide operations.
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    /// Settings for task discovery.
    #[serde(default)]
    pub tasks: TaskConfig,
}

impl HiveConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Examples
    ///
    /// ```
    /// use hivework::HiveConfig;
    ///
    /// let config = HiveConfig::from_toml_str("[worker]\nheartbeat_interval_ms = 250\n").unwrap();
    /// assert_eq!(config.worker.heartbeat_interval_ms, 250);
    /// assert_eq!(config.coordinator.poll_interval_ms, 100);
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| HiveError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| HiveError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Rejects zero intervals, which would turn polling loops into busy
    /// loops.
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("worker.heartbeat_interval_ms", self.worker.heartbeat_interval_ms),
            ("coordinator.poll_interval_ms", self.coordinator.poll_interval_ms),
            ("tasks.poll_interval_ms", self.tasks.poll_interval_ms),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(HiveError::Config(format!("{name} must be greater than zero")));
            }
        }
        if self.coordinator.max_write_attempts == 0 {
            return Err(HiveError::Config(
                "coordinator.max_write_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-worker settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Label recorded in the worker's registry entry.
    #[serde(default = "default_worker_name")]
    pub name: String,
    /// Interval between heartbeat writes (and work-loop ticks).
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: default_worker_name(),
            heartbeat_interval_ms: default_heartbeat_interval(),
        }
    }
}

impl WorkerConfig {
    /// Sets the worker label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the heartbeat interval.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = duration_ms(interval).max(1);
        self
    }

    /// Heartbeat interval as a [`Duration`], at least 1 ms.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }
}

fn default_worker_name() -> String {
    "hivework::Worker".to_string()
}

fn default_heartbeat_interval() -> u64 {
    1_000
}

/// Settings for [`WorkerCoordinator`](crate::worker::WorkerCoordinator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Default deadline for `change_state` and friends.
    #[serde(default = "default_state_change_timeout")]
    pub state_change_timeout_ms: u64,
    /// Default staleness threshold and liveness wait for `refresh`.
    #[serde(default = "default_stall_timeout")]
    pub stall_timeout_ms: u64,
    /// Interval between registry polls while waiting.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Attempts a registry read-modify-write makes before giving up.
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            state_change_timeout_ms: default_state_change_timeout(),
            stall_timeout_ms: default_stall_timeout(),
            poll_interval_ms: default_poll_interval(),
            max_write_attempts: default_max_write_attempts(),
        }
    }
}

impl CoordinatorConfig {
    /// Sets the default `change_state` deadline.
    pub fn with_state_change_timeout(mut self, timeout: Duration) -> Self {
        self.state_change_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the default stall threshold.
    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the registry poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = duration_ms(interval).max(1);
        self
    }

    /// Default `change_state` deadline.
    pub fn state_change_timeout(&self) -> Duration {
        Duration::from_millis(self.state_change_timeout_ms)
    }

    /// Default stall threshold.
    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    /// Registry poll interval, at least 1 ms.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn default_state_change_timeout() -> u64 {
    5_000
}

fn default_stall_timeout() -> u64 {
    10_000
}

fn default_poll_interval() -> u64 {
    100
}

fn default_max_write_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// Settings for [`Finder`](crate::task::Finder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Default deadline for `next_available`.
    #[serde(default = "default_next_available_timeout")]
    pub next_available_timeout_ms: u64,
    /// Interval between polls in `next_available`.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            next_available_timeout_ms: default_next_available_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl TaskConfig {
    /// Default `next_available` deadline.
    pub fn next_available_timeout(&self) -> Duration {
        Duration::from_millis(self.next_available_timeout_ms)
    }

    /// Poll interval for `next_available`, at least 1 ms.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

fn default_next_available_timeout() -> u64 {
    5_000
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
