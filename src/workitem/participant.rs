//! The workitem collection seam and its storage-backed implementation.

use async_trait::async_trait;

use super::{Sid, Workitem};
use crate::constants::WORKITEMS_NAMESPACE;
use crate::error::{HiveError, Result};
use crate::store::backend::{make_key, make_prefix, ABSENT_VERSION};
use crate::store::document::{decode, encode};
use crate::store::{SharedBackend, StorageError};

/// The engine's collection of pending workitems.
///
/// Writes are optimistic: [`update`](Self::update) only succeeds if the
/// stored copy is still at `workitem.version`, and fails with a
/// [`StorageError::VersionConflict`](crate::store::StorageError::VersionConflict)
/// (wrapped in [`HiveError::Store`]) otherwise.
#[async_trait]
pub trait WorkitemStore: Send + Sync {
    /// Every pending workitem, oldest delivery first.
    async fn all(&self) -> Result<Vec<Workitem>>;

    /// Pending workitems delivered to one participant.
    async fn by_participant(&self, participant_name: &str) -> Result<Vec<Workitem>> {
        let mut items = self.all().await?;
        items.retain(|wi| wi.participant_name == participant_name);
        Ok(items)
    }

    /// Looks up one workitem.
    ///
    /// # Errors
    ///
    /// [`HiveError::MissingWorkitem`] if `sid` is malformed.
    async fn get(&self, sid: &str) -> Result<Option<Workitem>>;

    /// Persists changes to a workitem without advancing it. Returns the
    /// stored copy with its new version.
    async fn update(&self, workitem: &Workitem) -> Result<Workitem>;

    /// Advances a workitem past this participant, removing it from the
    /// pending collection.
    ///
    /// # Errors
    ///
    /// [`HiveError::MissingWorkitem`] if it was already removed.
    async fn proceed(&self, workitem: &Workitem) -> Result<()>;
}

/// Storage participant keeping each workitem as a document under
/// `workitems/{sid}`.
#[derive(Clone)]
pub struct StorageParticipant {
    backend: SharedBackend,
}

impl std::fmt::Debug for StorageParticipant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageParticipant").finish_non_exhaustive()
    }
}

impl StorageParticipant {
    /// Creates a participant over `backend`.
    pub fn new(backend: SharedBackend) -> Self {
        Self { backend }
    }

    fn key(sid: &str) -> String {
        make_key(WORKITEMS_NAMESPACE, sid)
    }

    /// Engine side: stores a newly delivered workitem.
    ///
    /// # Errors
    ///
    /// A version conflict if a workitem with the same `sid` is pending.
    pub async fn deliver(&self, workitem: Workitem) -> Result<Workitem> {
        let sid: Sid = workitem.sid.parse()?;
        let mut workitem = workitem;
        workitem.wfid = sid.wfid;
        let bytes = encode(&workitem)?;
        workitem.version = self
            .backend
            .put_if_version(&Self::key(&workitem.sid), &bytes, ABSENT_VERSION)
            .await?;
        tracing::debug!(
            sid = %workitem.sid,
            participant = %workitem.participant_name,
            "workitem delivered"
        );
        Ok(workitem)
    }
}

#[async_trait]
impl WorkitemStore for StorageParticipant {
    async fn all(&self) -> Result<Vec<Workitem>> {
        let records = self
            .backend
            .list_by_prefix(&make_prefix(WORKITEMS_NAMESPACE))
            .await?;
        let mut items = records
            .into_iter()
            .map(|(key, record)| {
                let mut wi: Workitem = decode(&key, &record.data)?;
                wi.version = record.version;
                Ok(wi)
            })
            .collect::<Result<Vec<_>>>()?;
        items.sort_by(|a, b| {
            a.dispatched_at
                .cmp(&b.dispatched_at)
                .then_with(|| a.sid.cmp(&b.sid))
        });
        Ok(items)
    }

    async fn get(&self, sid: &str) -> Result<Option<Workitem>> {
        sid.parse::<Sid>()?;
        let key = Self::key(sid);
        match self.backend.get(&key).await {
            Ok(record) => {
                let mut wi: Workitem = decode(&key, &record.data)?;
                wi.version = record.version;
                Ok(Some(wi))
            },
            Err(StorageError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, workitem: &Workitem) -> Result<Workitem> {
        let bytes = encode(workitem)?;
        let version = self
            .backend
            .put_if_version(&Self::key(&workitem.sid), &bytes, workitem.version)
            .await?;
        tracing::debug!(sid = %workitem.sid, version, "workitem updated");
        let mut stored = workitem.clone();
        stored.version = version;
        Ok(stored)
    }

    async fn proceed(&self, workitem: &Workitem) -> Result<()> {
        if !self.backend.delete(&Self::key(&workitem.sid)).await? {
            return Err(HiveError::MissingWorkitem {
                sid: workitem.sid.clone(),
            });
        }
        tracing::info!(sid = %workitem.sid, wfid = %workitem.wfid, "workitem proceeded");
        Ok(())
    }
}
