//! Shared state store: backend trait, in-memory backend and JSON document
//! helpers.
//!
//! # Architecture
//!
//! 1. **[`StorageBackend`]** -- dumb versioned KV trait that backends
//!    implement. No coordination logic.
//! 2. **[`document`]** -- typed JSON documents on top of a backend, with the
//!    one read-modify-write loop ([`document::read_modify_write`]) that
//!    retries on optimistic conflicts.
//! 3. Callers ([`WorkerRegistry`](crate::worker::WorkerRegistry),
//!    [`StorageParticipant`](crate::workitem::StorageParticipant)) own the
//!    keys and the domain rules.
//!
//! Backends are shared as [`SharedBackend`] (`Arc<dyn StorageBackend>`), so
//! every worker, coordinator and finder in a process can hold the same one.

pub mod backend;
pub mod document;
pub mod memory;

use std::sync::Arc;

pub use backend::{StorageBackend, StorageError, VersionedRecord, ABSENT_VERSION};
pub use memory::InMemoryBackend;

/// A storage backend shared between workers, coordinators and finders.
pub type SharedBackend = Arc<dyn StorageBackend>;
