//! Captured process errors.

use serde::{Deserialize, Serialize};

use crate::workitem::{EntityRef, Workitem};

/// Action recorded for every process error.
pub const PROCESS_ERROR_ACTION: &str = "process error";

/// An execution fault captured on a workitem.
///
/// # Examples
///
/// ```
/// use hivework::error_record::ErrorRecord;
/// use hivework::workitem::{EntityRef, Workitem};
///
/// let wi = Workitem::new("zabme123", "dillo")
///     .with_wf_name("armadillo")
///     .with_entity(&EntityRef::new("Lizards", 1234));
/// let record = ErrorRecord::from_workitem(&wi, "something is amiss");
/// assert_eq!(record.actor.as_deref(), Some("armadillo"));
/// assert_eq!(record.target, Some(EntityRef::new("Lizards", 1234)));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Name of the process that failed.
    pub actor: Option<String>,
    /// Always [`PROCESS_ERROR_ACTION`].
    pub action: String,
    /// Entity the failing workitem referred to.
    pub target: Option<EntityRef>,
    /// Process id.
    pub wfid: String,
    /// Raw error payload from the engine.
    pub error: String,
}

impl ErrorRecord {
    /// Captures `error` against the workitem it was raised on.
    pub fn from_workitem(workitem: &Workitem, error: impl Into<String>) -> Self {
        Self {
            actor: workitem.wf_name.clone(),
            action: PROCESS_ERROR_ACTION.to_string(),
            target: workitem.entity_ref(),
            wfid: workitem.wfid.clone(),
            error: error.into(),
        }
    }

    /// Emits the record as a structured `tracing` error event.
    pub fn log(&self) {
        let target_type = self.target.as_ref().map(|t| t.entity_type.as_str());
        let target_id = self.target.as_ref().map(|t| t.entity_id.to_string());
        tracing::error!(
            actor = self.actor.as_deref().unwrap_or(""),
            action = %self.action,
            target_type = target_type.unwrap_or(""),
            target_id = target_id.as_deref().unwrap_or(""),
            wfid = %self.wfid,
            error = %self.error,
            "process error"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_without_entity_has_no_target() {
        let wi = Workitem::new("zabme123", "dillo").with_wf_name("armadillo");
        let record = ErrorRecord::from_workitem(&wi, "boom");
        assert_eq!(record.action, PROCESS_ERROR_ACTION);
        assert_eq!(record.target, None);
        assert_eq!(record.wfid, "zabme123");
        record.log();
    }
}
