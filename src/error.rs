//! Error types for worker coordination and task claiming.
//!
//! Provides [`HiveError`], the crate-wide error enum. Storage-level failures
//! arrive as [`StorageError`] and are wrapped in [`HiveError::Store`];
//! optimistic version conflicts are retried inside the write paths and
//! only surface as [`HiveError::ConflictRetriesExhausted`] when a write
//! keeps losing the race.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use crate::store::backend::StorageError;
use crate::worker::WorkerState;

/// Convenience alias used throughout the crate.
pub type Result<T, E = HiveError> = std::result::Result<T, E>;

/// Errors that can occur while coordinating workers or handling tasks.
///
/// # Examples
///
/// ```
/// use hivework::HiveError;
///
/// let err = HiveError::AlreadyClaimed {
///     task_id: "0_0!abc!wf-1".to_string(),
///     claimant: "boss".to_string(),
/// };
/// assert!(err.is_recoverable());
/// assert!(err.to_string().contains("boss"));
/// ```
#[derive(Debug, Error)]
pub enum HiveError {
    /// A claim was attempted with a token other than the current claimant's.
    #[error("task {task_id} already claimed by {claimant}")]
    AlreadyClaimed {
        /// The task that was being claimed.
        task_id: String,
        /// The token currently holding the claim.
        claimant: String,
    },

    /// No matching task appeared before the polling deadline.
    #[error("no tasks found matching criteria within {waited:?}")]
    AvailabilityTimeout {
        /// How long the finder waited.
        waited: Duration,
    },

    /// Live workers did not converge on the requested state in time.
    #[error("worker states did not change to {target} in time: {states:?}")]
    WorkerStateNotChanged {
        /// The state that was requested.
        target: WorkerState,
        /// Live worker states observed when the deadline passed.
        states: BTreeMap<String, WorkerState>,
    },

    /// Lookup by identifier found nothing, or the identifier was malformed.
    #[error("workitem not found: {sid}")]
    MissingWorkitem {
        /// The identifier that was looked up.
        sid: String,
    },

    /// A read-modify-write kept hitting version conflicts.
    #[error("gave up writing {key} after {attempts} conflicting attempts")]
    ConflictRetriesExhausted {
        /// The contended key.
        key: String,
        /// Number of attempts made.
        attempts: u32,
    },

    /// A document could not be serialized or deserialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend storage error.
    #[error(transparent)]
    Store(#[from] StorageError),
}

impl HiveError {
    /// Returns `true` for conditions a caller is expected to handle by
    /// retrying later or picking other work.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AlreadyClaimed { .. } | Self::AvailabilityTimeout { .. }
        )
    }
}

impl From<serde_json::Error> for HiveError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = HiveError::MissingWorkitem {
            sid: "bogus".to_string(),
        };
        assert_eq!(err.to_string(), "workitem not found: bogus");

        let err = HiveError::ConflictRetriesExhausted {
            key: "variables/workers".to_string(),
            attempts: 16,
        };
        assert!(err.to_string().contains("variables/workers"));
        assert!(err.to_string().contains("16"));

        let mut states = BTreeMap::new();
        states.insert("w1".to_string(), WorkerState::Running);
        let err = HiveError::WorkerStateNotChanged {
            target: WorkerState::Paused,
            states,
        };
        let msg = err.to_string();
        assert!(msg.contains("paused"));
        assert!(msg.contains("w1"));
    }

    #[test]
    fn recoverable_errors() {
        assert!(HiveError::AvailabilityTimeout {
            waited: Duration::from_millis(200)
        }
        .is_recoverable());
        assert!(!HiveError::MissingWorkitem {
            sid: "x".to_string()
        }
        .is_recoverable());
        assert!(!HiveError::WorkerStateNotChanged {
            target: WorkerState::Stopped,
            states: BTreeMap::new(),
        }
        .is_recoverable());
    }

    #[test]
    fn storage_errors_convert_transparently() {
        let err: HiveError = StorageError::NotFound {
            key: "k/v".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "key not found: k/v");
    }
}
