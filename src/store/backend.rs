//! The versioned key-value store shared by workers, coordinators and the
//! workitem participant.
//!
//! The [`StorageBackend`] trait is the shared state store every worker and
//! coordinator talks through. It exposes five KV operations:
//! [`get`](StorageBackend::get), [`put`](StorageBackend::put),
//! [`put_if_version`](StorageBackend::put_if_version),
//! [`delete`](StorageBackend::delete) and
//! [`list_by_prefix`](StorageBackend::list_by_prefix).
//!
//! Coordination logic (heartbeats, stall detection, claim checks) does
//! **not** belong here. Backends are dumb KV stores; the registry and the
//! workitem participant build their read-modify-write loops on top.
//!
//! # Key Structure
//!
//! Keys are composite strings in the format `{namespace}/{name}`, e.g.
//! `variables/workers` or `workitems/0_0!ab12!20260101-wfid`. Prefix
//! queries use `{namespace}/` to enumerate a namespace.
//!
//! # Versioning
//!
//! Each stored document carries a monotonic `u64` version number starting
//! at 1, incremented on every successful write. The
//! [`put_if_version`](StorageBackend::put_if_version) method provides
//! compare-and-swap (CAS) semantics for optimistic concurrency. An expected
//! version of [`ABSENT_VERSION`] means "the key must not exist yet".

use async_trait::async_trait;
use thiserror::Error;

/// Expected version passed to [`StorageBackend::put_if_version`] to create
/// a document only if no document exists under the key.
pub const ABSENT_VERSION: u64 = 0;

/// A stored document paired with its monotonic version number.
///
/// # Examples
///
/// ```
/// use hivework::store::backend::VersionedRecord;
///
/// let record = VersionedRecord {
///     data: b"{}".to_vec(),
///     version: 1,
/// };
/// assert_eq!(record.version, 1);
/// assert_eq!(record.data, b"{}");
/// ```
#[derive(Debug, Clone)]
pub struct VersionedRecord {
    /// The serialized document bytes (canonical JSON).
    pub data: Vec<u8>,

    /// Monotonic version number. Starts at 1, increments on each
    /// successful write.
    pub version: u64,
}

/// Failures of a single storage call.
///
/// # Examples
///
/// ```
/// use hivework::store::backend::StorageError;
///
/// let err = StorageError::NotFound { key: "variables/workers".to_string() };
/// assert!(err.to_string().contains("variables/workers"));
///
/// let err = StorageError::VersionConflict {
///     key: "k".to_string(),
///     expected: 2,
///     actual: 3,
/// };
/// assert!(err.to_string().contains("expected 2"));
/// ```
#[derive(Debug, Error)]
pub enum StorageError {
    /// The requested key was not found in storage.
    #[error("key not found: {key}")]
    NotFound {
        /// The key that was not found.
        key: String,
    },

    /// A [`put_if_version`](StorageBackend::put_if_version) call failed
    /// because the stored version does not match the expected version.
    /// `actual` is [`ABSENT_VERSION`] when the key does not exist.
    #[error("version conflict on key {key}: expected {expected}, found {actual}")]
    VersionConflict {
        /// The key where the conflict occurred.
        key: String,
        /// The version the caller expected.
        expected: u64,
        /// The actual version found in storage.
        actual: u64,
    },

    /// An I/O or backend-specific error occurred.
    #[error("backend error: {message}")]
    Backend {
        /// Human-readable description of the error.
        message: String,
        /// The underlying error, if available.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl StorageError {
    /// Returns `true` for optimistic-concurrency conflicts that callers
    /// should resolve by re-reading and retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

/// Key-value storage backend shared by workers, coordinators and task
/// finders.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single backend is shared by
/// every worker loop in the process.
///
/// # Consistency
///
/// The only guarantee relied upon is atomic single-document
/// read-modify-write through [`put_if_version`](StorageBackend::put_if_version).
/// There are no multi-document transactions.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieves a document by key.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if no document exists for the key.
    /// - [`StorageError::Backend`] on backend failures.
    async fn get(&self, key: &str) -> Result<VersionedRecord, StorageError>;

    /// Stores a document unconditionally (create or overwrite) and returns
    /// the assigned version.
    async fn put(&self, key: &str, data: &[u8]) -> Result<u64, StorageError>;

    /// Stores a document only if the current version matches
    /// `expected_version`, returning the new version.
    ///
    /// Pass [`ABSENT_VERSION`] to create a document that must not exist yet.
    ///
    /// # Errors
    ///
    /// - [`StorageError::VersionConflict`] if the stored version (or
    ///   absence) does not match `expected_version`.
    /// - [`StorageError::Backend`] on backend failures.
    async fn put_if_version(
        &self,
        key: &str,
        data: &[u8],
        expected_version: u64,
    ) -> Result<u64, StorageError>;

    /// Deletes a document. Returns `true` if the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Lists all documents whose key starts with `prefix`.
    async fn list_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, VersionedRecord)>, StorageError>;
}

/// Constructs a storage key from a namespace and a document name.
///
/// # Examples
///
/// ```
/// use hivework::store::backend::make_key;
///
/// assert_eq!(make_key("variables", "workers"), "variables/workers");
/// assert_eq!(make_key("workitems", ""), "workitems/");
/// ```
pub fn make_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Constructs the prefix enumerating every document in a namespace.
pub fn make_prefix(namespace: &str) -> String {
    format!("{namespace}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_both_versions() {
        let err = StorageError::VersionConflict {
            key: "variables/worker_state".to_string(),
            expected: 4,
            actual: 6,
        };
        assert_eq!(
            err.to_string(),
            "version conflict on key variables/worker_state: expected 4, found 6"
        );
        assert!(err.is_conflict());
    }

    #[test]
    fn only_version_conflicts_are_retryable() {
        let missing = StorageError::NotFound {
            key: "workitems/0_0!a!wf".to_string(),
        };
        let broken = StorageError::Backend {
            message: "disk full".to_string(),
            source: Some(Box::new(std::io::Error::other("ENOSPC"))),
        };
        assert!(!missing.is_conflict());
        assert!(!broken.is_conflict());
        assert!(std::error::Error::source(&missing).is_none());
        assert_eq!(
            std::error::Error::source(&broken).map(ToString::to_string),
            Some("ENOSPC".to_string())
        );
    }

    #[test]
    fn workitem_keys_fall_under_their_namespace_prefix() {
        let key = make_key("workitems", "0_0!abc!wf");
        assert_eq!(key, "workitems/0_0!abc!wf");
        assert!(key.starts_with(&make_prefix("workitems")));
        assert!(!make_key("variables", "workers").starts_with(&make_prefix("workitems")));
    }
}
