//! Worker lifecycle states.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle state of one worker as recorded in the registry.
///
/// ```text
/// Unknown -> Running <-> Paused -> Stopped
/// Running | Paused -> Stalled   (staleness detection only)
/// ```
///
/// Unrecognised or missing values deserialize as [`WorkerState::Unknown`].
///
/// # Examples
///
/// ```
/// use hivework::WorkerState;
///
/// assert!(WorkerState::Running.is_live());
/// assert!(WorkerState::Paused.is_live());
/// assert!(!WorkerState::Stalled.is_live());
/// assert_eq!(WorkerState::Paused.to_string(), "paused");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    /// Processing work.
    Running,
    /// Heartbeating but not processing work.
    Paused,
    /// Shut down; terminal for this worker id.
    Stopped,
    /// Marked by a coordinator after missing heartbeats.
    Stalled,
    /// No recognisable state recorded.
    #[default]
    #[serde(other)]
    Unknown,
}

impl WorkerState {
    /// Returns `true` for the states a live worker reports: `running` and
    /// `paused`.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Returns `true` for states a worker can be asked to adopt through the
    /// control document.
    pub fn is_requestable(&self) -> bool {
        matches!(self, Self::Running | Self::Paused | Self::Stopped)
    }

    /// Lowercase name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Stalled => "stalled",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerState {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "running" => Self::Running,
            "paused" => Self::Paused,
            "stopped" => Self::Stopped,
            "stalled" => Self::Stalled,
            _ => Self::Unknown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(WorkerState::Stalled).unwrap(),
            json!("stalled")
        );
    }

    #[test]
    fn unrecognised_values_are_unknown() {
        let state: WorkerState = serde_json::from_value(json!("sleepy")).unwrap();
        assert_eq!(state, WorkerState::Unknown);
        assert_eq!("".parse::<WorkerState>().unwrap(), WorkerState::Unknown);
    }

    #[test]
    fn display_matches_parse() {
        for state in [
            WorkerState::Running,
            WorkerState::Paused,
            WorkerState::Stopped,
            WorkerState::Stalled,
            WorkerState::Unknown,
        ] {
            assert_eq!(state.to_string().parse::<WorkerState>().unwrap(), state);
        }
    }

    #[test]
    fn stalled_is_not_requestable() {
        assert!(!WorkerState::Stalled.is_requestable());
        assert!(!WorkerState::Unknown.is_requestable());
        assert!(WorkerState::Stopped.is_requestable());
    }
}
