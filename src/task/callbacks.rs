//! Per-nickname task lifecycle callbacks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::Task;
use crate::error::Result;

/// Hooks around [`Task::update`] and [`Task::complete`].
///
/// All methods default to no-ops, so implementors only override what they
/// need. A `before_*` hook returning an error aborts the operation before
/// anything is written; `after_*` hooks run once the write succeeded.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use hivework::task::{Task, TaskCallbacks};
/// use serde_json::{Map, Value};
///
/// struct StampCompletion;
///
/// #[async_trait]
/// impl TaskCallbacks for StampCompletion {
///     async fn before_complete(&self, task: &mut Task, _params: &Map<String, Value>) -> hivework::Result<()> {
///         task.set("completed_by", "hivework");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TaskCallbacks: Send + Sync {
    /// Runs before the update's params are merged and persisted.
    async fn before_update(&self, task: &mut Task, params: &Map<String, Value>) -> Result<()> {
        let _ = (task, params);
        Ok(())
    }

    /// Runs after the update was persisted.
    async fn after_update(&self, task: &Task, params: &Map<String, Value>) {
        let _ = (task, params);
    }

    /// Runs before the completion's params are merged and the workitem
    /// proceeds.
    async fn before_complete(&self, task: &mut Task, params: &Map<String, Value>) -> Result<()> {
        let _ = (task, params);
        Ok(())
    }

    /// Runs after the workitem proceeded. `task` is the final view.
    async fn after_complete(&self, task: &Task, params: &Map<String, Value>) {
        let _ = (task, params);
    }
}

/// Callbacks keyed by task nickname, plus callbacks applied to every task.
#[derive(Default, Clone)]
pub struct CallbackRegistry {
    every_task: Vec<Arc<dyn TaskCallbacks>>,
    by_nickname: HashMap<String, Vec<Arc<dyn TaskCallbacks>>>,
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("every_task", &self.every_task.len())
            .field("nicknames", &self.by_nickname.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CallbackRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds callbacks run for every task.
    pub fn register_default<C: TaskCallbacks + 'static>(&mut self, callbacks: C) -> &mut Self {
        self.every_task.push(Arc::new(callbacks));
        self
    }

    /// Adds callbacks run for tasks with the given nickname.
    pub fn register<C: TaskCallbacks + 'static>(
        &mut self,
        nickname: impl Into<String>,
        callbacks: C,
    ) -> &mut Self {
        self.by_nickname
            .entry(nickname.into())
            .or_default()
            .push(Arc::new(callbacks));
        self
    }

    /// `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.every_task.is_empty() && self.by_nickname.is_empty()
    }

    /// Callbacks applying to `nickname`: the defaults first, then the
    /// nickname's own, each in registration order.
    pub fn for_nickname(&self, nickname: Option<&str>) -> Vec<Arc<dyn TaskCallbacks>> {
        let specific = nickname
            .and_then(|n| self.by_nickname.get(n))
            .into_iter()
            .flatten();
        self.every_task.iter().chain(specific).cloned().collect()
    }
}
