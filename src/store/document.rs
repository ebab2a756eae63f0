//! Typed JSON documents over a [`StorageBackend`].
//!
//! Every piece of shared mutable state (the worker registry, the worker
//! control document, each workitem) is a single JSON document updated by
//! [`read_modify_write`]: read the current version, apply a mutation,
//! write it back with [`put_if_version`](StorageBackend::put_if_version),
//! and start over from a fresh read when another writer got there first.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{HiveError, Result};
use crate::store::backend::{StorageBackend, StorageError, ABSENT_VERSION};

/// Default number of attempts a read-modify-write makes before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 16;

/// A deserialized document together with the version it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    /// The document body.
    pub doc: T,
    /// Storage version the body was read at.
    pub version: u64,
}

pub(crate) fn encode<T: Serialize>(doc: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(doc).map_err(HiveError::from)
}

pub(crate) fn decode<T: DeserializeOwned>(key: &str, data: &[u8]) -> Result<T> {
    serde_json::from_slice(data)
        .map_err(|e| HiveError::Serialization(format!("failed to decode {key}: {e}")))
}

/// Reads and decodes the document stored under `key`.
///
/// Returns `Ok(None)` when the key does not exist.
pub async fn read<T: DeserializeOwned>(
    backend: &dyn StorageBackend,
    key: &str,
) -> Result<Option<Versioned<T>>> {
    match backend.get(key).await {
        Ok(record) => Ok(Some(Versioned {
            doc: decode(key, &record.data)?,
            version: record.version,
        })),
        Err(StorageError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Applies `mutate` to the document under `key` and writes it back with
/// compare-and-swap, retrying from a fresh read on version conflicts.
///
/// `mutate` receives `None` when the document does not exist yet and must
/// return the full new document. It may run several times, so it must not
/// have side effects beyond computing the new document; returning an error
/// aborts the loop without writing.
///
/// # Errors
///
/// - Whatever `mutate` returns.
/// - [`HiveError::ConflictRetriesExhausted`] after `max_attempts`
///   consecutive conflicts.
/// - [`HiveError::Store`] for non-conflict backend failures.
pub async fn read_modify_write<T, F>(
    backend: &dyn StorageBackend,
    key: &str,
    max_attempts: u32,
    mut mutate: F,
) -> Result<Versioned<T>>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(Option<T>) -> Result<T>,
{
    for attempt in 1..=max_attempts {
        let current = read::<T>(backend, key).await?;
        let expected = current.as_ref().map_or(ABSENT_VERSION, |c| c.version);
        let next = mutate(current.map(|c| c.doc))?;
        let bytes = encode(&next)?;

        match backend.put_if_version(key, &bytes, expected).await {
            Ok(version) => {
                return Ok(Versioned { doc: next, version });
            },
            Err(e) if e.is_conflict() => {
                tracing::debug!(key = key, attempt = attempt, "write conflict, retrying");
                tokio::task::yield_now().await;
            },
            Err(e) => return Err(e.into()),
        }
    }

    tracing::warn!(key = key, attempts = max_attempts, "write conflict retries exhausted");
    Err(HiveError::ConflictRetriesExhausted {
        key: key.to_string(),
        attempts: max_attempts,
    })
}
