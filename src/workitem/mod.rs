//! Pending workitems: the engine-owned collection tasks are views over.
//!
//! A [`Workitem`] is one unit of work delivered to a participant queue.
//! The [`WorkitemStore`] trait is the seam to the engine; a
//! [`StorageParticipant`] implements it over a [`StorageBackend`](crate::store::StorageBackend),
//! storing each workitem as its own document under `workitems/{sid}`.

pub mod entity;
pub mod participant;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::constants::{CLAIMANT_PARAM, ENTITY_ID_FIELD, ENTITY_TYPE_FIELD, TASK_PARAM};
use crate::error::HiveError;

pub use entity::{Entity, EntityRef};
pub use participant::{StorageParticipant, WorkitemStore};

/// A workitem collection shared between finders and task views.
pub type SharedWorkitems = Arc<dyn WorkitemStore>;

/// Parsed workitem identifier, `{expid}!{subid}!{wfid}`.
///
/// # Examples
///
/// ```
/// use hivework::workitem::Sid;
///
/// let sid: Sid = "0_0!f00d!wf-1".parse().unwrap();
/// assert_eq!(sid.wfid, "wf-1");
/// assert!("not-a-sid".parse::<Sid>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Sid {
    /// Expression id within the process.
    pub expid: String,
    /// Sub-process id.
    pub subid: String,
    /// Process (workflow instance) id.
    pub wfid: String,
}

impl Sid {
    /// Builds an identifier for a fresh delivery into process `wfid`.
    pub fn generate(wfid: impl Into<String>) -> Self {
        Self {
            expid: "0_0".to_string(),
            subid: Uuid::new_v4().simple().to_string(),
            wfid: wfid.into(),
        }
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!{}!{}", self.expid, self.subid, self.wfid)
    }
}

impl FromStr for Sid {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let missing = || HiveError::MissingWorkitem { sid: s.to_string() };
        let mut parts = s.splitn(3, '!');
        let (Some(expid), Some(subid), Some(wfid)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(missing());
        };
        if expid.is_empty() || subid.is_empty() || wfid.is_empty() || wfid.contains('!') {
            return Err(missing());
        }
        Ok(Self {
            expid: expid.to_string(),
            subid: subid.to_string(),
            wfid: wfid.to_string(),
        })
    }
}

/// One pending unit of work.
///
/// # Examples
///
/// ```
/// use hivework::workitem::{EntityRef, Workitem};
///
/// let wi = Workitem::new("wf-1", "chefs")
///     .with_task("make_pie")
///     .with_entity(&EntityRef::new("Pie", 12));
/// assert_eq!(wi.task_nickname(), Some("make_pie"));
/// assert_eq!(wi.claimant(), None);
/// assert_eq!(wi.entity_ref(), Some(EntityRef::new("Pie", 12)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workitem {
    /// Identifier, `{expid}!{subid}!{wfid}`.
    pub sid: String,

    /// Process id.
    pub wfid: String,

    /// Process definition name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wf_name: Option<String>,

    /// Queue (role) the workitem was delivered to.
    pub participant_name: String,

    /// Business payload.
    #[serde(default)]
    pub fields: Map<String, Value>,

    /// Delivery parameters, including `task` and `claimant`.
    #[serde(default)]
    pub params: Map<String, Value>,

    /// When the engine delivered the workitem. Orders the collection.
    #[serde(default = "Utc::now")]
    pub dispatched_at: DateTime<Utc>,

    /// Storage version this copy was read at; `0` if never stored.
    #[serde(skip)]
    pub version: u64,
}

impl Workitem {
    /// Creates an unstored workitem for process `wfid`, delivered to
    /// `participant_name`.
    pub fn new(wfid: impl Into<String>, participant_name: impl Into<String>) -> Self {
        let sid = Sid::generate(wfid);
        Self {
            wfid: sid.wfid.clone(),
            sid: sid.to_string(),
            wf_name: None,
            participant_name: participant_name.into(),
            fields: Map::new(),
            params: Map::new(),
            dispatched_at: Utc::now(),
            version: 0,
        }
    }

    /// Sets the process definition name.
    pub fn with_wf_name(mut self, name: impl Into<String>) -> Self {
        self.wf_name = Some(name.into());
        self
    }

    /// Sets the `task` param.
    pub fn with_task(mut self, nickname: impl Into<String>) -> Self {
        self.params
            .insert(TASK_PARAM.to_string(), Value::String(nickname.into()));
        self
    }

    /// Sets one field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Points the workitem at a domain object.
    pub fn with_entity(mut self, entity: &dyn Entity) -> Self {
        self.fields.insert(
            ENTITY_TYPE_FIELD.to_string(),
            Value::String(entity.entity_type()),
        );
        self.fields
            .insert(ENTITY_ID_FIELD.to_string(), entity.identifier());
        self
    }

    /// The `task` param, if it is a string.
    pub fn task_nickname(&self) -> Option<&str> {
        self.params.get(TASK_PARAM).and_then(Value::as_str)
    }

    /// The current claimant token, if any.
    pub fn claimant(&self) -> Option<&str> {
        self.params.get(CLAIMANT_PARAM).and_then(Value::as_str)
    }

    /// Sets or clears the claimant token.
    pub fn set_claimant(&mut self, token: Option<&str>) {
        let value = token.map_or(Value::Null, |t| Value::String(t.to_string()));
        self.params.insert(CLAIMANT_PARAM.to_string(), value);
    }

    /// `true` when both entity fields are present and non-null.
    pub fn has_entity_fields(&self) -> bool {
        let present = |key: &str| self.fields.get(key).is_some_and(|v| !v.is_null());
        present(ENTITY_TYPE_FIELD) && present(ENTITY_ID_FIELD)
    }

    /// The referenced domain object, if both entity fields are set.
    pub fn entity_ref(&self) -> Option<EntityRef> {
        if !self.has_entity_fields() {
            return None;
        }
        let entity_type = self.fields.get(ENTITY_TYPE_FIELD)?.as_str()?;
        let entity_id = self.fields.get(ENTITY_ID_FIELD)?.clone();
        Some(EntityRef::new(entity_type, entity_id))
    }

    /// `true` if the workitem points at `entity`.
    pub fn refers_to(&self, entity: &dyn Entity) -> bool {
        self.fields.get(ENTITY_TYPE_FIELD).and_then(Value::as_str)
            == Some(entity.entity_type().as_str())
            && self.fields.get(ENTITY_ID_FIELD) == Some(&entity.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn generated_sid_parses_back() {
        let wi = Workitem::new("wf-7", "role");
        let sid: Sid = wi.sid.parse().unwrap();
        assert_eq!(sid.wfid, "wf-7");
        assert_eq!(sid.to_string(), wi.sid);
    }

    #[test]
    fn malformed_sids_are_missing_workitems() {
        for bad in ["", "a!b", "!b!c", "a!!c", "a!b!", "a!b!c!d"] {
            let err = bad.parse::<Sid>().unwrap_err();
            assert!(matches!(err, HiveError::MissingWorkitem { .. }), "{bad}");
        }
    }

    #[test]
    fn claimant_is_nullable() {
        let mut wi = Workitem::new("wf", "role");
        wi.set_claimant(Some("boss"));
        assert_eq!(wi.claimant(), Some("boss"));
        wi.set_claimant(None);
        assert_eq!(wi.claimant(), None);
        assert_eq!(wi.params[CLAIMANT_PARAM], Value::Null);
    }

    #[test]
    fn entity_matching_is_scalar_equality() {
        let wi = Workitem::new("wf", "role").with_entity(&EntityRef::new("Pie", 12));
        assert!(wi.refers_to(&EntityRef::new("Pie", 12)));
        assert!(!wi.refers_to(&EntityRef::new("Pie", "12")));
        assert!(!wi.refers_to(&EntityRef::new("Cake", 12)));
    }

    #[test]
    fn entity_fields_require_both_values() {
        let wi = Workitem::new("wf", "role").with_field(ENTITY_ID_FIELD, 1);
        assert!(!wi.has_entity_fields());
        let wi = wi.with_field(ENTITY_TYPE_FIELD, Value::Null);
        assert!(!wi.has_entity_fields());
        assert_eq!(wi.entity_ref(), None);
    }

    #[test]
    fn version_is_not_serialized() {
        let mut wi = Workitem::new("wf", "role").with_task("t");
        wi.version = 9;
        let value = serde_json::to_value(&wi).unwrap();
        assert!(value.get("version").is_none());
        assert_eq!(value["params"], json!({"task": "t"}));
    }
}
