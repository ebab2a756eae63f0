//! Tasks: read/write views over pending workitems, and the claim protocol.
//!
//! A [`Task`] wraps one [`Workitem`] together with a handle on the
//! collection it came from. Local changes made with [`Task::set`] stay
//! local until [`update`](Task::update) or [`complete`](Task::complete)
//! persists them.
//!
//! # Claiming
//!
//! The `claimant` param marks which actor is working a task.
//! [`claim`](Task::claim) re-reads the stored workitem, refuses if another
//! token holds it, and writes the new claimant with compare-and-swap,
//! starting over from a fresh read when the write races with another
//! writer. Claiming again with the token already held succeeds.
//! [`release`](Task::release) clears the claimant without checking who
//! holds it.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use hivework::store::InMemoryBackend;
//! use hivework::workitem::{SharedWorkitems, StorageParticipant, Workitem};
//! use hivework::{HiveError, Task};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> hivework::Result<()> {
//! let participant = StorageParticipant::new(Arc::new(InMemoryBackend::new()));
//! participant
//!     .deliver(Workitem::new("wf-1", "chefs").with_task("bake_pie"))
//!     .await?;
//! let store: SharedWorkitems = Arc::new(participant);
//!
//! let mut task = Task::for_role(&store, "chefs").await?.remove(0);
//! task.claim("alice").await?;
//! assert_eq!(task.claimant(), Some("alice"));
//!
//! let mut stale = Task::find_by_id(&store, task.id()).await?;
//! assert!(matches!(stale.claim("bob").await, Err(HiveError::AlreadyClaimed { .. })));
//! # Ok(())
//! # }
//! ```

pub mod callbacks;
pub mod finder;

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{HiveError, Result};
use crate::store::document::DEFAULT_MAX_ATTEMPTS;
use crate::workitem::{EntityRef, SharedWorkitems, Workitem};

pub use callbacks::{CallbackRegistry, TaskCallbacks};
pub use finder::{Finder, Predicate};

/// A view over one pending workitem.
#[derive(Clone)]
pub struct Task {
    workitem: Workitem,
    nickname: Option<String>,
    store: SharedWorkitems,
    callbacks: Arc<CallbackRegistry>,
    max_attempts: u32,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("sid", &self.workitem.sid)
            .field("nickname", &self.nickname)
            .field("role", &self.workitem.participant_name)
            .field("claimant", &self.workitem.claimant())
            .finish_non_exhaustive()
    }
}

impl Task {
    /// Wraps `workitem`. The nickname is captured from its `task` param now
    /// and does not follow later changes to that param.
    pub fn new(workitem: Workitem, store: SharedWorkitems) -> Self {
        let nickname = workitem.task_nickname().map(str::to_string);
        Self {
            workitem,
            nickname,
            store,
            callbacks: Arc::new(CallbackRegistry::default()),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Attaches lifecycle callbacks.
    pub fn with_callbacks(mut self, callbacks: Arc<CallbackRegistry>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Sets how many conflicting attempts a claim or update makes before
    /// giving up.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Every pending task.
    pub async fn all(store: &SharedWorkitems) -> Result<Vec<Task>> {
        Finder::new(store.clone()).all().await
    }

    /// Pending tasks for one role.
    pub async fn for_role(store: &SharedWorkitems, role: &str) -> Result<Vec<Task>> {
        Finder::new(store.clone()).for_role(role).all().await
    }

    /// Pending tasks for any of `roles`. An empty slice yields no tasks.
    pub async fn for_roles(store: &SharedWorkitems, roles: &[&str]) -> Result<Vec<Task>> {
        Finder::new(store.clone())
            .for_roles(roles.iter().copied())
            .all()
            .await
    }

    /// Looks up one task by its identifier.
    ///
    /// # Errors
    ///
    /// [`HiveError::MissingWorkitem`] if nothing is pending under `sid` or
    /// `sid` is malformed.
    pub async fn find_by_id(store: &SharedWorkitems, sid: &str) -> Result<Task> {
        match store.get(sid).await? {
            Some(workitem) => Ok(Task::new(workitem, store.clone())),
            None => Err(HiveError::MissingWorkitem {
                sid: sid.to_string(),
            }),
        }
    }

    /// The task identifier (the workitem's `sid`).
    pub fn id(&self) -> &str {
        &self.workitem.sid
    }

    /// Task type, captured when the view was created.
    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    /// The participant (queue) the task waits in.
    pub fn role(&self) -> &str {
        &self.workitem.participant_name
    }

    /// Process id.
    pub fn wfid(&self) -> &str {
        &self.workitem.wfid
    }

    /// Process definition name.
    pub fn wf_name(&self) -> Option<&str> {
        self.workitem.wf_name.as_deref()
    }

    /// The underlying workitem as this view currently sees it.
    pub fn workitem(&self) -> &Workitem {
        &self.workitem
    }

    /// All fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.workitem.fields
    }

    /// All params.
    pub fn params(&self) -> &Map<String, Value> {
        &self.workitem.params
    }

    /// One field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.workitem.fields.get(key)
    }

    /// Sets one field locally. Persisted by the next `update` or
    /// `complete`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.workitem.fields.insert(key.into(), value.into());
    }

    /// `true` when both `entity_type` and `entity_id` fields are set.
    pub fn has_entity_fields(&self) -> bool {
        self.workitem.has_entity_fields()
    }

    /// The domain object this task refers to.
    pub fn entity_ref(&self) -> Option<EntityRef> {
        self.workitem.entity_ref()
    }

    /// Token of the current claimant, as of this view.
    pub fn claimant(&self) -> Option<&str> {
        self.workitem.claimant()
    }

    /// `true` if this view has a claimant.
    pub fn is_claimed(&self) -> bool {
        self.claimant().is_some()
    }

    /// Replaces this view with the stored workitem, dropping local changes.
    pub async fn reload(&mut self) -> Result<()> {
        self.workitem = self.fetch().await?;
        Ok(())
    }

    async fn fetch(&self) -> Result<Workitem> {
        self.store
            .get(&self.workitem.sid)
            .await?
            .ok_or_else(|| HiveError::MissingWorkitem {
                sid: self.workitem.sid.clone(),
            })
    }

    /// Claims the task for `token`.
    ///
    /// # Errors
    ///
    /// - [`HiveError::AlreadyClaimed`] if another token holds the task.
    /// - [`HiveError::MissingWorkitem`] if the task is no longer pending.
    pub async fn claim(&mut self, token: &str) -> Result<()> {
        self.write_claimant(Some(token)).await
    }

    /// Clears the claimant, whoever holds it.
    pub async fn release(&mut self) -> Result<()> {
        self.write_claimant(None).await
    }

    async fn write_claimant(&mut self, token: Option<&str>) -> Result<()> {
        for attempt in 1..=self.max_attempts {
            let mut stored = self.fetch().await?;
            if let (Some(token), Some(holder)) = (token, stored.claimant()) {
                if holder != token {
                    return Err(HiveError::AlreadyClaimed {
                        task_id: stored.sid.clone(),
                        claimant: holder.to_string(),
                    });
                }
            }
            if stored.claimant() == token {
                self.workitem.set_claimant(token);
                self.workitem.version = stored.version;
                return Ok(());
            }

            stored.set_claimant(token);
            match self.store.update(&stored).await {
                Ok(written) => {
                    self.workitem.set_claimant(token);
                    self.workitem.version = written.version;
                    tracing::debug!(sid = %stored.sid, claimant = ?token, "claimant written");
                    return Ok(());
                },
                Err(HiveError::Store(ref e)) if e.is_conflict() => {
                    tracing::debug!(sid = %stored.sid, attempt, "claim conflict, retrying");
                    tokio::task::yield_now().await;
                },
                Err(e) => return Err(e),
            }
        }
        Err(self.retries_exhausted())
    }

    fn retries_exhausted(&self) -> HiveError {
        HiveError::ConflictRetriesExhausted {
            key: self.workitem.sid.clone(),
            attempts: self.max_attempts,
        }
    }

    /// Merges `params` into the fields and persists the view without
    /// advancing the workitem.
    ///
    /// When the stored copy changed since this view was read, the stored
    /// claimant is kept and this view's fields are written over it.
    pub async fn update(&mut self, params: Map<String, Value>) -> Result<()> {
        let callbacks = self.callbacks.for_nickname(self.nickname());
        for callback in &callbacks {
            callback.before_update(self, &params).await?;
        }
        self.merge(&params);
        self.persist().await?;
        for callback in &callbacks {
            callback.after_update(self, &params).await;
        }
        Ok(())
    }

    async fn persist(&mut self) -> Result<()> {
        for attempt in 1..=self.max_attempts {
            match self.store.update(&self.workitem).await {
                Ok(written) => {
                    self.workitem.version = written.version;
                    return Ok(());
                },
                Err(HiveError::Store(ref e)) if e.is_conflict() => {
                    tracing::debug!(sid = %self.workitem.sid, attempt, "update conflict, reloading claimant");
                    let stored = self.fetch().await?;
                    self.workitem.set_claimant(stored.claimant());
                    self.workitem.version = stored.version;
                },
                Err(e) => return Err(e),
            }
        }
        Err(self.retries_exhausted())
    }

    /// Merges `params` into the fields and advances the workitem past this
    /// participant. The task leaves the pending collection.
    pub async fn complete(mut self, params: Map<String, Value>) -> Result<()> {
        let callbacks = self.callbacks.for_nickname(self.nickname());
        for callback in &callbacks {
            callback.before_complete(&mut self, &params).await?;
        }
        self.merge(&params);
        self.store.proceed(&self.workitem).await?;
        tracing::info!(sid = %self.workitem.sid, nickname = ?self.nickname, "task completed");
        for callback in &callbacks {
            callback.after_complete(&self, &params).await;
        }
        Ok(())
    }

    fn merge(&mut self, params: &Map<String, Value>) {
        for (key, value) in params {
            self.workitem.fields.insert(key.clone(), value.clone());
        }
    }
}
