//! Well-known storage keys and namespaces.

/// Namespace for coordination variables.
pub const VARIABLES_NAMESPACE: &str = "variables";

/// Namespace holding one document per pending workitem.
pub const WORKITEMS_NAMESPACE: &str = "workitems";

/// Registry document mapping `worker_id` to its heartbeat record.
pub const WORKERS_KEY: &str = "variables/workers";

/// Cluster-wide desired worker state and the `worker_state_enabled` flag.
pub const WORKER_STATE_KEY: &str = "variables/worker_state";

/// Workitem param holding the task nickname.
pub const TASK_PARAM: &str = "task";

/// Workitem param holding the current claimant token.
pub const CLAIMANT_PARAM: &str = "claimant";

/// Workitem field naming the external entity's type.
pub const ENTITY_TYPE_FIELD: &str = "entity_type";

/// Workitem field holding the external entity's identifier.
pub const ENTITY_ID_FIELD: &str = "entity_id";
