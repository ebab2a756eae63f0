//! In-memory storage backend.
//!
//! [`InMemoryBackend`] provides a thread-safe [`StorageBackend`]
//! implementation using `DashMap<String, (Vec<u8>, u64)>`. It is a dumb KV
//! store with no coordination logic, suitable for running a whole worker
//! pool inside one process and for tests.
//!
//! # Concurrency
//!
//! Every write goes through the `DashMap` entry API, so the version check
//! and the write of [`put_if_version`](StorageBackend::put_if_version)
//! happen under the same shard lock. That is the single-document
//! serialization the registry and the claim protocol depend on.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//! use hivework::store::memory::InMemoryBackend;
//! use hivework::worker::WorkerRegistry;
//!
//! let backend = Arc::new(InMemoryBackend::new());
//! let registry = WorkerRegistry::new(backend.clone());
//! ```

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::store::backend::{StorageBackend, StorageError, VersionedRecord, ABSENT_VERSION};

/// Thread-safe in-memory storage backend using [`DashMap`].
///
/// Stores serialized documents as `(Vec<u8>, u64)` tuples where the `u64`
/// is a monotonic version number starting at 1.
///
/// # Examples
///
/// ```
/// use hivework::store::memory::InMemoryBackend;
///
/// let backend = InMemoryBackend::new();
/// assert!(backend.is_empty());
/// ```
#[derive(Debug)]
pub struct InMemoryBackend {
    data: DashMap<String, (Vec<u8>, u64)>,
}

impl InMemoryBackend {
    /// Creates an empty in-memory backend.
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Returns the number of documents stored.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the backend contains no documents.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<VersionedRecord, StorageError> {
        let entry = self.data.get(key).ok_or_else(|| StorageError::NotFound {
            key: key.to_string(),
        })?;
        let (data, version) = entry.value();
        Ok(VersionedRecord {
            data: data.clone(),
            version: *version,
        })
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<u64, StorageError> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let new_version = entry.get().1 + 1;
                entry.insert((data.to_vec(), new_version));
                Ok(new_version)
            },
            Entry::Vacant(entry) => {
                entry.insert((data.to_vec(), 1));
                Ok(1)
            },
        }
    }

    async fn put_if_version(
        &self,
        key: &str,
        data: &[u8],
        expected_version: u64,
    ) -> Result<u64, StorageError> {
        match self.data.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let current_version = entry.get().1;
                if current_version != expected_version {
                    return Err(StorageError::VersionConflict {
                        key: key.to_string(),
                        expected: expected_version,
                        actual: current_version,
                    });
                }
                let new_version = current_version + 1;
                entry.insert((data.to_vec(), new_version));
                Ok(new_version)
            },
            Entry::Vacant(entry) => {
                if expected_version != ABSENT_VERSION {
                    return Err(StorageError::VersionConflict {
                        key: key.to_string(),
                        expected: expected_version,
                        actual: ABSENT_VERSION,
                    });
                }
                entry.insert((data.to_vec(), 1));
                Ok(1)
            },
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.remove(key).is_some())
    }

    async fn list_by_prefix(
        &self,
        prefix: &str,
    ) -> Result<Vec<(String, VersionedRecord)>, StorageError> {
        let mut results: Vec<(String, VersionedRecord)> = self
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| {
                let (data, version) = entry.value();
                (
                    entry.key().clone(),
                    VersionedRecord {
                        data: data.clone(),
                        version: *version,
                    },
                )
            })
            .collect();
        // DashMap iteration order is shard order; callers expect key order.
        results.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(results)
    }
}
