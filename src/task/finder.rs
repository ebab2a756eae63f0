//! Composable task queries.
//!
//! A [`Finder`] collects [`Predicate`]s and evaluates them, ANDed, against
//! every pending workitem. Builder calls commute: the same predicates in a
//! different order select the same tasks.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use hivework::store::InMemoryBackend;
//! use hivework::workitem::{StorageParticipant, Workitem};
//! use hivework::Finder;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> hivework::Result<()> {
//! let participant = StorageParticipant::new(Arc::new(InMemoryBackend::new()));
//! participant.deliver(Workitem::new("wf-1", "cat").with_task("purr")).await?;
//! participant.deliver(Workitem::new("wf-1", "human").with_task("pet")).await?;
//!
//! let tasks = Finder::new(Arc::new(participant)).for_role("cat").all().await?;
//! assert_eq!(tasks.len(), 1);
//! assert_eq!(tasks[0].nickname(), Some("purr"));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use super::callbacks::CallbackRegistry;
use super::Task;
use crate::config::TaskConfig;
use crate::error::{HiveError, Result};
use crate::support::poll_until;
use crate::workitem::{Entity, EntityRef, SharedWorkitems, Workitem};

/// One filter over pending workitems.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `params.task` equals the nickname.
    ByNickname(String),
    /// The participant is one of the roles. Matches nothing when empty.
    ForRoles(Vec<String>),
    /// `params.claimant` equals the token; `None` matches unclaimed tasks.
    ForClaimant(Option<String>),
    /// The entity fields equal the entity's type name and identifier.
    ForEntity(EntityRef),
}

impl Predicate {
    /// Evaluates the predicate against one workitem.
    pub fn matches(&self, workitem: &Workitem) -> bool {
        match self {
            Self::ByNickname(nickname) => workitem.task_nickname() == Some(nickname.as_str()),
            Self::ForRoles(roles) => roles.iter().any(|r| *r == workitem.participant_name),
            Self::ForClaimant(token) => workitem.claimant() == token.as_deref(),
            Self::ForEntity(entity) => workitem.refers_to(entity),
        }
    }
}

/// Query builder over the pending workitem collection.
#[derive(Clone)]
pub struct Finder {
    store: SharedWorkitems,
    predicates: Vec<Predicate>,
    callbacks: Arc<CallbackRegistry>,
    config: TaskConfig,
}

impl std::fmt::Debug for Finder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Finder")
            .field("predicates", &self.predicates)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Finder {
    /// A finder matching every task in `store`.
    pub fn new(store: SharedWorkitems) -> Self {
        Self {
            store,
            predicates: Vec::new(),
            callbacks: Arc::new(CallbackRegistry::default()),
            config: TaskConfig::default(),
        }
    }

    /// Uses the given polling settings for [`next_available`](Self::next_available).
    pub fn with_config(mut self, config: TaskConfig) -> Self {
        self.config = config;
        self
    }

    /// Attaches callbacks to every task this finder returns.
    pub fn with_callbacks(mut self, callbacks: Arc<CallbackRegistry>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Adds an arbitrary predicate.
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// The predicates added so far, in call order.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Tasks with the given nickname.
    pub fn by_nickname(self, nickname: impl Into<String>) -> Self {
        self.filter(Predicate::ByNickname(nickname.into()))
    }

    /// Tasks waiting for one role.
    pub fn for_role(self, role: impl Into<String>) -> Self {
        self.filter(Predicate::ForRoles(vec![role.into()]))
    }

    /// Tasks waiting for any of `roles`.
    pub fn for_roles<I, S>(self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter(Predicate::ForRoles(roles.into_iter().map(Into::into).collect()))
    }

    /// Tasks claimed by `token`.
    pub fn for_claimant(self, token: impl Into<String>) -> Self {
        self.filter(Predicate::ForClaimant(Some(token.into())))
    }

    /// Tasks nobody has claimed.
    pub fn unclaimed(self) -> Self {
        self.filter(Predicate::ForClaimant(None))
    }

    /// Tasks referring to `entity`.
    pub fn for_entity(self, entity: &dyn Entity) -> Self {
        self.filter(Predicate::ForEntity(entity.entity_ref()))
    }

    /// Every matching task, oldest delivery first.
    ///
    /// Workitems without a `task` param are never returned.
    pub async fn all(&self) -> Result<Vec<Task>> {
        let workitems = self.store.all().await?;
        Ok(workitems
            .into_iter()
            .filter(|wi| wi.task_nickname().is_some())
            .filter(|wi| self.predicates.iter().all(|p| p.matches(wi)))
            .map(|wi| self.wrap(wi))
            .collect())
    }

    fn wrap(&self, workitem: Workitem) -> Task {
        Task::new(workitem, self.store.clone()).with_callbacks(self.callbacks.clone())
    }

    /// The first matching task, if any.
    pub async fn first(&self) -> Result<Option<Task>> {
        Ok(self.all().await?.into_iter().next())
    }

    /// `true` when nothing matches.
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.first().await?.is_none())
    }

    /// Number of matching tasks.
    pub async fn count(&self) -> Result<usize> {
        Ok(self.all().await?.len())
    }

    /// Waits for a matching task, polling at the configured interval.
    ///
    /// `timeout` defaults to the configured `next_available_timeout`.
    ///
    /// # Errors
    ///
    /// [`HiveError::AvailabilityTimeout`] if nothing matched in time.
    pub async fn next_available(&self, timeout: Option<Duration>) -> Result<Task> {
        let timeout = timeout.unwrap_or_else(|| self.config.next_available_timeout());
        let outcome = poll_until(timeout, self.config.poll_interval(), || self.first()).await?;
        outcome.map_err(|waited| {
            tracing::debug!(waited = ?waited.waited, predicates = ?self.predicates, "no task became available");
            HiveError::AvailabilityTimeout {
                waited: waited.waited,
            }
        })
    }
}
